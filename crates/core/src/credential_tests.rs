// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn empty_string_input_is_absent() {
    let cred = Credential::builder().input("password", "").input("username", "bob").build();
    assert!(!cred.has_input("password"));
    assert!(cred.has_input("username"));
    assert!(!cred.has_input("missing"));
}

#[test]
fn non_string_inputs_stringify() {
    let cred = Credential::builder().input("verify_ssl", true).input("port", 22).build();
    assert_eq!(cred.input("verify_ssl").as_deref(), Some("true"));
    assert_eq!(cred.input("port").as_deref(), Some("22"));
    assert!(cred.input_bool("verify_ssl"));
}

#[test]
fn null_input_is_absent() {
    let cred = Credential::builder().input("become_method", Value::Null).build();
    assert!(!cred.has_input("become_method"));
    assert_eq!(cred.input_or_default("become_method"), "");
}

#[test]
fn category_uses_wire_names() {
    assert_eq!(CredentialCategory::Machine.as_str(), "ssh");
    assert_eq!("net".parse::<CredentialCategory>().unwrap(), CredentialCategory::Network);
}
