mod common;

use color_eyre::Result;
use common::*;
use pretty_assertions::assert_eq;
use tokio::io::AsyncWriteExt;

#[tokio::test]
async fn silent_client_is_timed_out_and_yields_to_next() -> Result<()> {
    let mut gateway = start_gateway_with_timeouts(100, 0).await?;

    // First becomes active but never says anything.
    let mut first = connect(gateway.addr).await?;

    let mut second = connect(gateway.addr).await?;
    second.write_all(b"hello-from-second").await?;

    // First's read deadline passes; it is hung up on and second takes
    // over without a new accept.
    assert_eq!(gateway.device_receives(17).await?, b"hello-from-second");
    recv_eof(&mut first).await?;

    Ok(())
}

#[tokio::test]
async fn fast_client_beats_its_deadline() -> Result<()> {
    let mut gateway = start_gateway_with_timeouts(1000, 1000).await?;

    let mut client = connect(gateway.addr).await?;
    client.write_all(b"quick").await?;
    assert_eq!(gateway.device_receives(5).await?, b"quick");

    gateway.device_sends(b"reply").await?;
    assert_eq!(recv_exact(&mut client, 5).await?, b"reply");

    Ok(())
}

#[tokio::test]
async fn timed_out_client_does_not_kill_the_service() -> Result<()> {
    let mut gateway = start_gateway_with_timeouts(50, 0).await?;

    // Times out while alone; no one is queued.
    let mut first = connect(gateway.addr).await?;
    recv_eof(&mut first).await?;

    // The service keeps accepting and serving.
    let mut second = connect(gateway.addr).await?;
    second.write_all(b"still-alive").await?;
    assert_eq!(gateway.device_receives(11).await?, b"still-alive");

    Ok(())
}
