use anyhow::{Context, Result, bail};
use uuid::Uuid;

use swap_types::models::Identity;

pub const USAGE: &str = "usage: swap-token <username> [user-id] [ttl-hours]";

const DEFAULT_TTL_HOURS: i64 = 24;

/// Arguments of the `swap-token` binary.
#[derive(Debug)]
pub struct TokenRequest {
    pub identity: Identity,
    pub ttl: chrono::Duration,
}

impl TokenRequest {
    pub fn from_args(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let Some(name) = args.next() else {
            bail!(USAGE);
        };
        let user_id = match args.next() {
            Some(raw) => raw.parse::<Uuid>().context("user-id must be a UUID")?,
            None => Uuid::new_v4(),
        };
        let ttl_hours: i64 = match args.next() {
            Some(raw) => raw.parse().context("ttl-hours must be a number")?,
            None => DEFAULT_TTL_HOURS,
        };
        let ttl = chrono::Duration::try_hours(ttl_hours).context("ttl-hours is out of range")?;

        Ok(Self {
            identity: Identity { user_id, name },
            ttl,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<TokenRequest> {
        TokenRequest::from_args(args.iter().map(|a| a.to_string()))
    }

    #[test]
    fn username_alone_gets_a_fresh_id_and_a_day() {
        let request = parse(&["alice"]).unwrap();
        assert_eq!(request.identity.name, "alice");
        assert_eq!(request.ttl, chrono::Duration::hours(24));
    }

    #[test]
    fn explicit_id_and_ttl_are_kept() {
        let id = Uuid::new_v4();
        let request = parse(&["bob", &id.to_string(), "2"]).unwrap();
        assert_eq!(request.identity.user_id, id);
        assert_eq!(request.ttl, chrono::Duration::hours(2));
    }

    #[test]
    fn bad_arguments_are_errors() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["carol", "not-a-uuid"]).is_err());
        let id = Uuid::new_v4().to_string();
        assert!(parse(&["carol", &id, "soon"]).is_err());
    }

    #[test]
    fn out_of_range_ttl_is_an_error() {
        let id = Uuid::new_v4().to_string();
        assert!(parse(&["carol", &id, &i64::MAX.to_string()]).is_err());
        assert!(parse(&["carol", &id, &i64::MIN.to_string()]).is_err());
    }
}
