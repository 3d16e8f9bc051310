use vtsync_shared::key::Key;
use vtsync_shared::InvalidKeyCause;

#[test]
fn sixteen_components_totaling_two_hundred_chars_is_valid() {
    // 16 components joined by 15 dots must total exactly 200 chars:
    // 16 * n + 15 == 200 has no integer solution, so split unevenly.
    let mut components = vec!["a".repeat(12); 15];
    components.push("a".repeat(20));
    let joined_len: usize =
        components.iter().map(|c| c.len()).sum::<usize>() + (components.len() - 1);
    assert_eq!(joined_len, 200);
    let key = Key::from_components(components).unwrap();
    assert_eq!(key.len(), 16);
}

#[test]
fn seventeenth_component_tips_it_over() {
    let components: Vec<String> = (0..17).map(|i| format!("c{i}")).collect();
    let err = Key::from_components(components).unwrap_err();
    assert!(matches!(err.cause, InvalidKeyCause::TooManyComponents { .. }));
}

#[test]
fn two_hundred_and_one_chars_is_invalid_even_with_few_components() {
    let key_str = format!("{}.{}", "a".repeat(100), "b".repeat(100));
    assert_eq!(key_str.len(), 201);
    let err = Key::parse(&key_str).unwrap_err();
    assert!(matches!(err.cause, InvalidKeyCause::TooLong { .. }));
}

#[test]
fn wildcard_fan_out_over_a_sixteen_component_descendant() {
    let pattern = Key::parse("base.#").unwrap();
    let deep = Key::parse("base.1.2.3.4.5.6.7.8.9.a.b.c.d.e.f").unwrap();
    assert_eq!(deep.len(), 16);
    assert!(pattern.matches(&deep));
}
