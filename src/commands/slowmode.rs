//! `slowmode` command: `off` or `<limit> <decay>` for the invoking channel.

use thiserror::Error;
use tracing::error;

use crate::cache::GuildCache;
use crate::error::CacheError;
use crate::models::slowmode::{DECAY_MAX, DECAY_MIN, LIMIT_MAX, LIMIT_MIN};

const FUZZY_FALSE: [&str; 6] = ["off", "false", "no", "disable", "disabled", "0"];

/// Failures reported back to the invoking user.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(
        "Missing argument, you must either pass in the `limit` and `decay` values to enable slowmode for this channel, or `off` to disable it for this channel."
    )]
    MissingArgument,
    #[error("Invalid argument given, the `limit` and `decay` must be valid numbers.")]
    InvalidArgument,
    #[error("{}", .0.user_message())]
    Cache(#[from] CacheError),
}

enum Action {
    Disable,
    Enable { limit: i64, decay: i64 },
}

/// Parse, apply and persist a slowmode change, returning the success text.
pub async fn execute(
    cache: &GuildCache,
    guild_id: &str,
    channel_id: &str,
    args: &[String],
) -> Result<String, CommandError> {
    let action = parse(args)?;

    let result = match action {
        Action::Disable => cache
            .update(guild_id, |guild| {
                guild.channel_mut(channel_id).slowmode_mut().set_enabled(false);
                Ok(format!(
                    "The `Slowmode` module has been **disabled** for the <#{channel_id}> channel."
                ))
            })
            .await,
        Action::Enable { limit, decay } => cache
            .update(guild_id, |guild| {
                guild.channel_mut(channel_id).slowmode_mut().enable(limit, decay)?;
                Ok(format!(
                    "Messages are now limited to {limit} message(s) every {decay} seconds."
                ))
            })
            .await,
    };

    result.map_err(|err| {
        error!(guild_id, channel_id, error = %err, "slowmode command failed");
        CommandError::from(err)
    })
}

fn parse(args: &[String]) -> Result<Action, CommandError> {
    match args {
        [] => Err(CommandError::MissingArgument),
        [flag] if is_fuzzy_false(flag) => Ok(Action::Disable),
        [limit, decay] => {
            let limit: i64 = limit.trim().parse().map_err(|_| CommandError::InvalidArgument)?;
            let decay: i64 = decay.trim().parse().map_err(|_| CommandError::InvalidArgument)?;
            Ok(Action::Enable {
                limit: limit.clamp(LIMIT_MIN.into(), LIMIT_MAX.into()),
                decay: decay.clamp(DECAY_MIN.into(), DECAY_MAX.into()),
            })
        }
        _ => Err(CommandError::InvalidArgument),
    }
}

fn is_fuzzy_false(value: &str) -> bool {
    let value = value.trim();
    FUZZY_FALSE.iter().any(|word| word.eq_ignore_ascii_case(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn no_arguments_is_missing_argument() {
        assert!(matches!(parse(&[]), Err(CommandError::MissingArgument)));
    }

    #[test]
    fn fuzzy_false_words_disable() {
        for word in ["off", "OFF", "no", "Disabled", "0"] {
            assert!(matches!(parse(&args(&[word])), Ok(Action::Disable)), "{word}");
        }
    }

    #[test]
    fn numbers_are_clamped_into_bounds() {
        match parse(&args(&["0", "1000"])) {
            Ok(Action::Enable { limit, decay }) => assert_eq!((limit, decay), (1, 300)),
            _ => panic!("expected enable"),
        }
        match parse(&args(&["-5", "3"])) {
            Ok(Action::Enable { limit, decay }) => assert_eq!((limit, decay), (1, 3)),
            _ => panic!("expected enable"),
        }
    }

    #[test]
    fn non_numeric_or_odd_arity_is_invalid() {
        for input in [&["five", "10"][..], &["on"], &["1", "2", "3"], &["1.5", "2"]] {
            assert!(
                matches!(parse(&args(input)), Err(CommandError::InvalidArgument)),
                "{input:?}"
            );
        }
    }

    #[test]
    fn user_texts_match_the_command_contract() {
        assert!(CommandError::InvalidArgument
            .to_string()
            .starts_with("Invalid argument given"));
        let not_found = CommandError::from(CacheError::tenant_not_found("G1"));
        assert!(!not_found.to_string().contains("G1"));
    }
}
