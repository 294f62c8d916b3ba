//! Drive an interactive shell on a pseudo-terminal

use popen_expect::{Case, Session, Verdict};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("popen-expect - Interactive Shell Example");
    println!("{}", "=".repeat(50));

    let mut session = Session::builder()
        .timeout(Duration::from_secs(5))
        .env("PS1", "demo$ ")
        .strip_colors(true)
        .spawn_pty("sh", &[])?;

    session.expect(r"demo\$ ").await?;
    session
        .send_line("for i in 1 2 3; do echo \"step $i\"; done")
        .await?;

    // report each step as it goes by, then stop at the next prompt
    let mut cases = [
        Case::regex(r"step \d+\n")?.matched_only().on_match(|line| {
            print!("  {}", String::from_utf8_lossy(line));
            Verdict::Continue
        }),
        Case::regex(r"demo\$ ")?.matched_only(),
    ];
    session.expect_cases(&mut cases).await?;

    session.send_line("exit 0").await?;
    let code = session.wait().await?;
    println!("\nShell exited with {code}");

    Ok(())
}
