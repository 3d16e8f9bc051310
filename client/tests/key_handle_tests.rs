//! `KeyHandle` navigation and the local, pre-network validation it performs
//! before ever touching the scheduler (spec §4.A, §6, §7).

use vtsync_client::{App, WriteInput, WriteOptions};
use vtsync_shared::Acl;

fn app() -> App {
    // Never actually connects in these tests; every assertion here is
    // satisfied before a socket would be touched.
    App::connect("example.invalid", 1, false)
}

#[tokio::test]
async fn invalid_key_strings_are_reported_without_panicking() {
    let app = app();
    let handle = app.key("foo..bar");
    assert!(handle.error().is_some());
    assert!(!handle.is_key_pattern());
}

#[tokio::test]
async fn parent_and_child_navigate_without_touching_the_network() {
    let app = app();
    let handle = app.key("rooms.lobby.users");
    assert_eq!(handle.parent().last_component(), Some("lobby".to_string()));
    let child = handle.child(Some("admins"));
    assert_eq!(child.last_component(), Some("admins".to_string()));
    assert!(child.error().is_none());
}

#[tokio::test]
async fn writing_through_a_pattern_is_rejected_locally_as_invalid_request() {
    let app = app();
    let handle = app.key("rooms.*.users");
    let err = handle.write("hello", WriteOptions::default()).await.unwrap_err();
    assert_eq!(err.error_code(), 3);
}

#[tokio::test]
async fn writing_a_bare_number_is_rejected_locally_as_invalid_request() {
    let app = app();
    let handle = app.key("rooms.lobby.count");
    let input: WriteInput = serde_json::json!(42).into();
    let err = handle.write(input, WriteOptions::default()).await.unwrap_err();
    assert_eq!(err.error_code(), 3);
}

#[tokio::test]
async fn deleting_through_an_invalid_key_surfaces_invalid_key_not_a_panic() {
    let app = app();
    let handle = app.key("foo.#.bar");
    let err = handle.delete().await.unwrap_err();
    assert_eq!(err.error_code(), 2);
}

#[test]
fn write_options_default_to_no_explicit_acl() {
    let opts = WriteOptions::default();
    assert!(opts.acl.is_none());
    let opts = WriteOptions { acl: Some(Acl::PublicReadCreate) };
    assert_eq!(opts.acl, Some(Acl::PublicReadCreate));
}
