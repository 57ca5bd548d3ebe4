// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn typed_config_accepts_a_queue_bound() {
    let config = ActivityConfig::for_type("orders.Invoice")
        .max_queue_length(8)
        .max_retries(5)
        .retry_delay(Duration::from_millis(20));

    assert_eq!(config.max_queue_length, Some(8));
    assert_eq!(config.max_retries, 5);
    assert_eq!(config.retry_delay, Duration::from_millis(20));
    assert!(!config.is_default_queue());
}

#[test]
fn default_queue_ignores_queue_bounds() {
    let config = ActivityConfig::default_queue().max_queue_length(8);

    assert!(config.is_default_queue());
    assert_eq!(config.max_queue_length, None);
}
