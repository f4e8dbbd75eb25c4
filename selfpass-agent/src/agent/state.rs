use serde::{Deserialize, Serialize};

/// Where the agent is in its login lifecycle.
///
/// - `Unpaired` → `LoggedIn` (pairing runs the first-time login)
/// - `LoggedIn` → `LoggedOut` (logout)
/// - `LoggedOut` → `LoggedIn` (login with the master password)
/// - any → `Unpaired` (unpair)
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum LoginState {
    #[default]
    Unpaired,
    LoggedOut,
    LoggedIn,
}

/// Summary of the agent for status displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub state: LoginState,
    pub username: Option<String>,
    pub device_id: Option<String>,
    pub server_address: Option<String>,
    /// Entries in the live keystore, when logged in.
    pub entries: Option<usize>,
}
