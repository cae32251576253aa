//! Probe command: shows where the endpoint is looked for and tries a
//! handshake.

use std::time::Duration;

use tunecord_ipc::{IpcConfig, Locator, Session};

use crate::error::{ClientError, ClientResult};

/// Lists candidate sockets, connects and waits for `READY`.
pub async fn probe(ipc: &IpcConfig, timeout: Duration) -> ClientResult<()> {
    let locator = Locator::from_config(ipc);

    println!("directory: {}", locator.dir().display());
    if locator.is_sandboxed() {
        println!("sandboxed: yes ({} is set)", ipc.sandbox_marker);
    }

    let candidates = locator.candidates().await;
    if candidates.is_empty() {
        println!("candidates: none");
    } else {
        println!("candidates:");
        for path in &candidates {
            println!("  {}", path.display());
        }
    }

    let session = Session::new(ipc);
    let attempt = async {
        session.connect(&locator).await?;
        session.wait_ready().await
    };

    let result = tokio::time::timeout(timeout, attempt).await;
    let outcome = match result {
        Ok(Ok(())) => {
            let user = session
                .ready_info()
                .await
                .and_then(|info| info.user)
                .map(|user| user.display_name().to_string());
            match user {
                Some(name) => println!("handshake: ok (logged in as {})", name),
                None => println!("handshake: ok"),
            }
            Ok(())
        }
        Ok(Err(e)) => {
            println!("handshake: failed ({})", session.status());
            Err(ClientError::from(e))
        }
        Err(_) => {
            println!("handshake: no READY within {}s", timeout.as_secs());
            Err(ClientError::Timeout(format!(
                "no READY from the peer within {}s",
                timeout.as_secs()
            )))
        }
    };

    session.disconnect().await;
    outcome
}
