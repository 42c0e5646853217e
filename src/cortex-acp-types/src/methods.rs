//! ACP method name constants.
//!
//! The session engine treats method names as opaque strings; only
//! [`SESSION_PROMPT`] and [`SESSION_CANCEL`] get special handling.

use serde_json::Value;

use crate::Role;

// Client -> agent
/// Initialize the connection.
pub const INITIALIZE: &str = "initialize";
/// Authenticate with one of the advertised auth methods.
pub const AUTHENTICATE: &str = "authenticate";
/// Create a new session.
pub const SESSION_NEW: &str = "session/new";
/// Load an existing session.
pub const SESSION_LOAD: &str = "session/load";
/// Start a prompt turn.
pub const SESSION_PROMPT: &str = "session/prompt";
/// Switch the session mode.
pub const SESSION_SET_MODE: &str = "session/set_mode";
/// Switch the session model.
pub const SESSION_SET_MODEL: &str = "session/set_model";
/// Cancel the running turn (notification).
pub const SESSION_CANCEL: &str = "session/cancel";

// Agent -> client
/// Ask the user for permission to run a tool call.
pub const SESSION_REQUEST_PERMISSION: &str = "session/request_permission";
/// Streaming progress update (notification).
pub const SESSION_UPDATE: &str = "session/update";
/// Read a text file from the editor.
pub const FS_READ_TEXT_FILE: &str = "fs/read_text_file";
/// Write a text file through the editor.
pub const FS_WRITE_TEXT_FILE: &str = "fs/write_text_file";
/// Create a terminal.
pub const TERMINAL_CREATE: &str = "terminal/create";
/// Fetch terminal output.
pub const TERMINAL_OUTPUT: &str = "terminal/output";
/// Release a terminal.
pub const TERMINAL_RELEASE: &str = "terminal/release";
/// Wait for the terminal command to exit.
pub const TERMINAL_WAIT_FOR_EXIT: &str = "terminal/wait_for_exit";
/// Kill the terminal command.
pub const TERMINAL_KILL: &str = "terminal/kill";

/// Methods served by the agent.
pub const AGENT_METHODS: &[&str] = &[
    INITIALIZE,
    AUTHENTICATE,
    SESSION_NEW,
    SESSION_LOAD,
    SESSION_PROMPT,
    SESSION_SET_MODE,
    SESSION_SET_MODEL,
    SESSION_CANCEL,
];

/// Methods served by the client.
pub const CLIENT_METHODS: &[&str] = &[
    SESSION_REQUEST_PERMISSION,
    SESSION_UPDATE,
    FS_READ_TEXT_FILE,
    FS_WRITE_TEXT_FILE,
    TERMINAL_CREATE,
    TERMINAL_OUTPUT,
    TERMINAL_RELEASE,
    TERMINAL_WAIT_FOR_EXIT,
    TERMINAL_KILL,
];

/// Which role is expected to serve `method`, if it is a catalog method.
pub fn served_by(method: &str) -> Option<Role> {
    if AGENT_METHODS.contains(&method) {
        Some(Role::Agent)
    } else if CLIENT_METHODS.contains(&method) {
        Some(Role::Client)
    } else {
        None
    }
}

/// Capability that must be negotiated before `role` can be expected to
/// serve the optional `method`.
///
/// Used to enrich method-not-found errors for well-known optional methods.
pub fn capability_hint(role: Role, method: &str) -> Option<&'static str> {
    match (role, method) {
        (Role::Agent, AUTHENTICATE) => Some("authMethods"),
        (Role::Agent, SESSION_LOAD) => Some("loadSession"),
        (Role::Agent, SESSION_SET_MODE) => Some("modes"),
        (Role::Agent, SESSION_SET_MODEL) => Some("models"),
        (Role::Client, FS_READ_TEXT_FILE) => Some("fs.readTextFile"),
        (Role::Client, FS_WRITE_TEXT_FILE) => Some("fs.writeTextFile"),
        (
            Role::Client,
            TERMINAL_CREATE | TERMINAL_OUTPUT | TERMINAL_RELEASE | TERMINAL_WAIT_FOR_EXIT
            | TERMINAL_KILL,
        ) => Some("terminal"),
        _ => None,
    }
}

/// Extract the `sessionId` carried by session-scoped params.
pub fn session_id_param(params: Option<&Value>) -> Option<&str> {
    params?.get("sessionId")?.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_served_by() {
        assert_eq!(served_by(SESSION_PROMPT), Some(Role::Agent));
        assert_eq!(served_by(TERMINAL_KILL), Some(Role::Client));
        assert_eq!(served_by("_zed/custom"), None);
    }

    #[test]
    fn test_capability_hint_is_role_specific() {
        assert_eq!(
            capability_hint(Role::Client, FS_READ_TEXT_FILE),
            Some("fs.readTextFile")
        );
        assert_eq!(capability_hint(Role::Agent, FS_READ_TEXT_FILE), None);
        assert_eq!(capability_hint(Role::Agent, SESSION_LOAD), Some("loadSession"));
        assert_eq!(capability_hint(Role::Agent, SESSION_PROMPT), None);
    }

    #[test]
    fn test_session_id_param() {
        let params = json!({"sessionId": "sess-42", "prompt": []});
        assert_eq!(session_id_param(Some(&params)), Some("sess-42"));
        assert_eq!(session_id_param(Some(&json!({"sessionId": 3}))), None);
        assert_eq!(session_id_param(None), None);
    }
}
