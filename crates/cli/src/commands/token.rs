use feedstock_core::auth::TokenService;
use feedstock_core::domain::tenant::Role;

use crate::commands::{load_config, CommandResult, EXIT_CONFIG};

/// Issues a bearer token for local use against the API. The token is the message.
pub fn run(tenant_id: &str, subject: &str, role: &str) -> CommandResult {
    let config = match load_config("token") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let role = match role.parse::<Role>() {
        Ok(role) => role,
        Err(error) => {
            return CommandResult::failure("token", "invalid_argument", error.to_string(), EXIT_CONFIG)
        }
    };

    let issued = TokenService::from_config(&config.auth)
        .and_then(|tokens| tokens.issue(tenant_id, subject, role));
    match issued {
        Ok(token) => CommandResult::success("token", token),
        Err(error) => CommandResult::failure("token", "token_issue", error.to_string(), EXIT_CONFIG),
    }
}
