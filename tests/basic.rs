mod common;

use color_eyre::Result;
use common::*;
use pretty_assertions::assert_eq;
use tokio::io::AsyncWriteExt;

#[tokio::test]
async fn client_bytes_reach_the_device() -> Result<()> {
    let mut gateway = start_gateway().await?;
    let mut client = connect(gateway.addr).await?;

    client.write_all(b"ABC").await?;

    assert_eq!(gateway.device_receives(3).await?, b"ABC");

    Ok(())
}

#[tokio::test]
async fn device_bytes_reach_the_active_client() -> Result<()> {
    let mut gateway = start_gateway().await?;
    let mut client = connect(gateway.addr).await?;

    // A round trip first, so we know the client is in work before the
    // device speaks.
    client.write_all(b"hello").await?;
    assert_eq!(gateway.device_receives(5).await?, b"hello");

    gateway.device_sends(b"XYZ").await?;
    assert_eq!(recv_exact(&mut client, 3).await?, b"XYZ");

    Ok(())
}

#[tokio::test]
async fn bytes_keep_their_order_both_ways() -> Result<()> {
    let mut gateway = start_gateway().await?;
    let mut client = connect(gateway.addr).await?;

    for chunk in [b"first".as_slice(), b"second", b"third"] {
        client.write_all(chunk).await?;
        assert_eq!(gateway.device_receives(chunk.len()).await?, chunk);
    }

    gateway.device_sends(b"one").await?;
    assert_eq!(recv_exact(&mut client, 3).await?, b"one");

    gateway.device_sends(b"two").await?;
    assert_eq!(recv_exact(&mut client, 3).await?, b"two");

    Ok(())
}

#[tokio::test]
async fn reconnecting_client_is_served_again() -> Result<()> {
    let mut gateway = start_gateway().await?;

    let mut client = connect(gateway.addr).await?;
    client.write_all(b"first session").await?;
    assert_eq!(gateway.device_receives(13).await?, b"first session");
    drop(client);

    let mut client = connect(gateway.addr).await?;
    client.write_all(b"second session").await?;
    assert_eq!(gateway.device_receives(14).await?, b"second session");

    Ok(())
}
