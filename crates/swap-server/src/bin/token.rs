//! Mint a bearer token the way the session provider would.
//!
//! Usage: `swap-token <username> [user-id] [ttl-hours]`

use swap_api::auth::issue_token;
use swap_server::{Config, TokenRequest};

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let request = TokenRequest::from_args(std::env::args().skip(1))?;

    let config = Config::from_env()?;
    let token = issue_token(&config.jwt_secret, &request.identity, request.ttl)?;

    eprintln!("user_id: {}", request.identity.user_id);
    println!("{}", token);
    Ok(())
}
