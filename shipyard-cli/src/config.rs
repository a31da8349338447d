//! Configuration module
//!
//! Where the server is and how to authenticate against it.

use shipyard_client::ShipyardClient;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the admin listener
    pub admin_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Config {
    /// Build a client, with credentials when a username is set
    pub fn client(&self) -> ShipyardClient {
        let client = ShipyardClient::new(&self.admin_url);
        match &self.username {
            Some(username) => {
                client.with_credentials(username, self.password.clone().unwrap_or_default())
            }
            None => client,
        }
    }
}
