// Drives the compiled binary through a PTY so the real crossterm loop runs.
// Needs a terminal, so it is Unix-only and ignored by default:
// `cargo test --test integration_min_session -- --ignored`

#![cfg(unix)]

use std::time::Duration;

use expectrl::{spawn, Eof};

#[test]
#[ignore]
fn exam_can_be_abandoned_from_the_terminal() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let bin = assert_cmd::cargo::cargo_bin("quizr");
    let cmd = format!(
        "{} --db {} start --mode exam --subject Mathematics -n 2 -t 1",
        bin.display(),
        dir.path().join("q.db").display()
    );

    let mut p = spawn(cmd)?;
    std::thread::sleep(Duration::from_millis(300));

    p.send("1")?;
    std::thread::sleep(Duration::from_millis(100));

    // leaving an exam asks for confirmation first
    p.send("q")?;
    std::thread::sleep(Duration::from_millis(100));
    p.send("y")?;

    p.expect("nothing was recorded")?;
    p.expect(Eof)?;
    Ok(())
}
