use gavel::{Config, EXAMPLE_CONFIG};

#[test]
fn example_config_parses() {
    let config = Config::parse_toml(EXAMPLE_CONFIG).unwrap();
    assert!(config.languages.contains_key("cpp17"));
    assert!(config.languages.contains_key("python3"));
}

#[test]
fn example_config_compiled_languages_have_commands() {
    let config = Config::parse_toml(EXAMPLE_CONFIG).unwrap();

    for id in ["c11", "cpp17", "java", "rust", "go"] {
        let lang = &config.languages[id];
        assert!(lang.is_compiled(), "{id} should be compiled");
    }
    assert!(!config.languages["python3"].is_compiled());
}

#[test]
fn example_config_has_queue_defaults() {
    let config = Config::parse_toml(EXAMPLE_CONFIG).unwrap();
    assert_eq!(config.queue.submissions_key, "gavel:queue:submissions");
    assert_eq!(config.queue.tests_prefix, "gavel:tests");
}
