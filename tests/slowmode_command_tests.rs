mod test_utils;

use guildcfg::commands::{CommandError, slowmode};
use test_utils::{create_test_guild, setup_test_cache};

fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[tokio::test]
async fn enable_then_disable() {
    let (cache, db) = setup_test_cache().await.unwrap();
    create_test_guild(&db, "G1", None).await.unwrap();

    let reply = slowmode::execute(&cache, "G1", "C1", &args(&["2", "15"]))
        .await
        .unwrap();
    assert_eq!(reply, "Messages are now limited to 2 message(s) every 15 seconds.");

    let guild = cache.get("G1").await.unwrap();
    let config = guild.channel("C1").unwrap().slowmode().unwrap();
    assert!(config.enabled());
    assert_eq!((config.limit(), config.decay()), (2, 15));

    let reply = slowmode::execute(&cache, "G1", "C1", &args(&["off"]))
        .await
        .unwrap();
    assert_eq!(
        reply,
        "The `Slowmode` module has been **disabled** for the <#C1> channel."
    );

    cache.invalidate("G1").await;
    let guild = cache.get("G1").await.unwrap();
    let config = guild.channel("C1").unwrap().slowmode().unwrap();
    assert!(!config.enabled());
    assert_eq!((config.limit(), config.decay()), (2, 15));
}

#[tokio::test]
async fn out_of_range_arguments_are_clamped() {
    let (cache, db) = setup_test_cache().await.unwrap();
    create_test_guild(&db, "G1", None).await.unwrap();

    let reply = slowmode::execute(&cache, "G1", "C1", &args(&["99", "0"]))
        .await
        .unwrap();
    assert_eq!(reply, "Messages are now limited to 30 message(s) every 1 seconds.");
}

#[tokio::test]
async fn bad_arguments_do_not_touch_the_store() {
    let (cache, db) = setup_test_cache().await.unwrap();
    create_test_guild(&db, "G1", None).await.unwrap();

    let missing = slowmode::execute(&cache, "G1", "C1", &[]).await.unwrap_err();
    assert!(matches!(missing, CommandError::MissingArgument));
    assert!(missing.to_string().starts_with("Missing argument"));

    let invalid = slowmode::execute(&cache, "G1", "C1", &args(&["fast", "5"]))
        .await
        .unwrap_err();
    assert!(matches!(invalid, CommandError::InvalidArgument));

    assert!(test_utils::stored_channels(&db, "G1").await.unwrap().is_none());
}

#[tokio::test]
async fn unknown_guild_gets_a_user_safe_message() {
    let (cache, _db) = setup_test_cache().await.unwrap();

    let err = slowmode::execute(&cache, "G404", "C1", &args(&["1", "5"]))
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::Cache(_)));
    let text = err.to_string();
    assert!(!text.contains("SELECT"));
    assert!(!text.contains("G404"));
}
