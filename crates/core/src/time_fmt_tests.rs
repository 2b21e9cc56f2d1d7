// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    zero = { 0, "0ms" },
    millis = { 450, "450ms" },
    one_second = { 1_000, "1s" },
    seconds = { 12_400, "12s" },
    minute_exact = { 120_000, "2m" },
    minute_seconds = { 90_000, "1m30s" },
    hour_exact = { 3_600_000, "1h" },
    hour_minutes = { 7_500_000, "2h5m" },
    no_day_unit = { 93_600_000, "26h" },
)]
fn test_format_duration_ms(ms: u64, expected: &str) {
    assert_eq!(format_duration_ms(ms), expected);
}

#[test]
fn test_output_round_trips_through_duration_parser_units() {
    // Two-unit forms split into parseable pieces: "1m30s" is "1m" + "30s"
    let rendered = format_duration_ms(90_000);
    assert_eq!(rendered, "1m30s");
    // The sub-second form is directly parseable workflow syntax
    assert_eq!(format_duration_ms(250), "250ms");
}
