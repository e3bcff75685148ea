// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

const VARS: [&str; 9] = [
    "SQ_DATABASE_URL",
    "SQ_POOL_SIZE",
    "SQ_POLL_INTERVAL_MS",
    "SQ_MAX_BATCH_SIZE",
    "SQ_NO_INTERACTIVE",
    "SQ_NAVIGATION_DIR",
    "SQ_ENGINE_COMMAND",
    "SQ_LOG_DIR",
    "SQ_TELEGRAM_TOKEN",
];

fn clear() {
    for var in VARS {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn unset_environment_overrides_nothing() {
    clear();
    assert_eq!(overrides().unwrap(), EnvOverrides::default());
}

#[test]
#[serial]
fn reads_every_variable() {
    clear();
    std::env::set_var("SQ_DATABASE_URL", "postgres://db/snapq");
    std::env::set_var("SQ_POOL_SIZE", "4");
    std::env::set_var("SQ_MAX_BATCH_SIZE", "3");
    std::env::set_var("SQ_NO_INTERACTIVE", "true");
    std::env::set_var("SQ_NAVIGATION_DIR", "/srv/nav");
    std::env::set_var("SQ_TELEGRAM_TOKEN", "");

    let env = overrides().unwrap();
    clear();

    assert_eq!(env.database_url.as_deref(), Some("postgres://db/snapq"));
    assert_eq!(env.pool_size, Some(4));
    assert_eq!(env.max_batch_size, Some(3));
    assert!(env.no_interactive);
    assert_eq!(env.navigation_dir, Some(PathBuf::from("/srv/nav")));
    assert_eq!(env.telegram_token, None);
}

#[yare::parameterized(
    bad_number = { "SQ_MAX_BATCH_SIZE", "ten" },
    bad_flag   = { "SQ_NO_INTERACTIVE", "maybe" },
)]
#[serial]
fn rejects_unparsable_values(var: &str, value: &str) {
    clear();
    std::env::set_var(var, value);
    let err = overrides().unwrap_err();
    clear();
    assert!(err.to_string().contains(var), "{}", err);
}
