use predicates::prelude::*;

fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"))
}

fn slotwatch() -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("slotwatch");
    cmd.env_remove("EMAIL_SENDER")
        .env_remove("EMAIL_PASSWORD")
        .env_remove("SLOTWATCH_WEBDRIVER_URL")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn validate_accepts_complete_config() {
    slotwatch()
        .env("EMAIL_SENDER", "alertas@example.com")
        .env("EMAIL_PASSWORD", "app-password")
        .args(["validate", "--config", &fixture("monitor.yaml")])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "provider: Isadora Leda Braga (725717342)",
        ))
        .stdout(predicate::str::contains("?medicom=725717342"))
        .stdout(predicate::str::contains("reference date: 11/03/2026"));
}

#[test]
fn validate_names_the_missing_credential() {
    slotwatch()
        .env("EMAIL_SENDER", "alertas@example.com")
        .args(["validate", "--config", &fixture("monitor.yaml")])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "missing required setting `sender_credential`",
        ));
}

#[test]
fn check_with_invalid_config_fails_before_launching_a_browser() {
    // No WebDriver is listening here; a launch attempt would show up as a
    // session error instead of the config error.
    slotwatch()
        .env("EMAIL_SENDER", "alertas@example.com")
        .env("EMAIL_PASSWORD", "app-password")
        .args([
            "check",
            "--config",
            &fixture("incomplete.yaml"),
            "--webdriver-url",
            "http://127.0.0.1:9",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid configuration"))
        .stderr(predicate::str::contains("`provider.name`"))
        .stderr(predicate::str::contains("webdriver").not());
}

#[test]
fn password_never_appears_in_debug_logs() {
    slotwatch()
        .env("RUST_LOG", "debug")
        .env("EMAIL_SENDER", "alertas@example.com")
        .env("EMAIL_PASSWORD", "hunter2-secret")
        .args(["validate", "--config", &fixture("monitor.yaml")])
        .assert()
        .success()
        .stderr(predicate::str::contains("parsed cli"))
        .stderr(predicate::str::contains("hunter2-secret").not());
}

#[test]
fn extract_prints_slots_before_reference_date() {
    slotwatch()
        .args([
            "extract",
            "--html",
            &fixture("slots.html"),
            "--reference-date",
            "2026-03-11",
            "--today",
            "2026-01-10",
        ])
        .assert()
        .success()
        .stdout(
            "19/02/2026 15:30\tQui, 19/02 - 15h30\n\
             25/02/2026 10:00\t25/02/2026 às 10:00\n",
        );
}

#[test]
fn extract_reads_calendar_agenda() {
    slotwatch()
        .args([
            "extract",
            "--html",
            &fixture("agenda.html"),
            "--reference-date",
            "2026-03-11",
            "--today",
            "2026-01-10",
        ])
        .assert()
        .success()
        .stdout(
            "19/02/2026 08:30\t19/02/2026 08:30\n\
             19/02/2026 09:10\t19/02/2026 09:10 (Encaixe)\n\
             19/02/2026 10:00\t19/02/2026 10:00\n",
        );
}

#[test]
fn extract_without_matches_prints_nothing() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let page = tmp.path().join("empty.html");
    std::fs::write(&page, "<html><body><p>Nenhum horário disponível</p></body></html>")
        .expect("write page");

    slotwatch()
        .args(["extract", "--html", page.to_str().expect("utf-8 path")])
        .assert()
        .success()
        .stdout("");
}
