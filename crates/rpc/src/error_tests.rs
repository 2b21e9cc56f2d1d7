// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    refused = { std::io::ErrorKind::ConnectionRefused, RpcErrorKind::Refused },
    timed_out = { std::io::ErrorKind::TimedOut, RpcErrorKind::Timeout },
    reset = { std::io::ErrorKind::ConnectionReset, RpcErrorKind::Reset },
    broken_pipe = { std::io::ErrorKind::BrokenPipe, RpcErrorKind::Reset },
    eof = { std::io::ErrorKind::UnexpectedEof, RpcErrorKind::Reset },
)]
fn test_io_error_classification(io_kind: std::io::ErrorKind, expected: RpcErrorKind) {
    let err: RpcError = std::io::Error::new(io_kind, "boom").into();
    assert_eq!(err.kind, expected);
}

#[test]
fn test_dns_classification_by_message() {
    let io = std::io::Error::other("failed to lookup address information: Name not known");
    let err: RpcError = io.into();
    assert_eq!(err.kind, RpcErrorKind::Dns);
}

#[test]
fn test_kind_display_is_machine_readable() {
    assert_eq!(RpcErrorKind::Refused.to_string(), "refused");
    assert_eq!(RpcErrorKind::Timeout.to_string(), "timeout");
    assert_eq!(RpcErrorKind::Protocol.to_string(), "protocol");
}

#[test]
fn test_error_display_carries_kind_and_message() {
    let err = RpcError::new(RpcErrorKind::Reset, "peer went away");
    assert_eq!(err.to_string(), "rpc error (reset): peer went away");
}
