//! Skip noise lines from a program run over plain pipes

use popen_expect::{Case, ExpectError, Session};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("popen-expect - Pipe Filter Example");
    println!("{}", "=".repeat(50));

    let script = "for i in 1 2 3; do echo \"debug: tick $i\"; done; echo 'result=ok'; sleep 1";
    let mut session = Session::builder()
        .timeout(Duration::from_millis(500))
        .retry_interval(Duration::from_millis(20))
        .spawn("sh", &["-c", script])?;

    let mut cases = [
        Case::regex("^debug: ")?.skip_till(b'\n'),
        Case::regex(r"result=(\w+)")?.matched_only(),
    ];

    match session.expect_cases(&mut cases).await {
        Ok(result) => println!("Got: {}", result.text()),
        Err(ExpectError::Timeout { duration }) => println!("Nothing within {duration:?}"),
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
