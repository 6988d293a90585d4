//! ---
//! rhome_section: "01-core-functionality"
//! rhome_subsection: "binary"
//! rhome_type: "source"
//! rhome_scope: "code"
//! rhome_description: "TCP line transport feeding the dispatch queues."
//! rhome_version: "v0.1.0"
//! rhome_owner: "tbd"
//! ---
//! Newline-framed TCP plumbing around the dispatch queues. Each connection
//! carries one or more lines; outbound lines are delivered on a fresh
//! connection to the endpoint named in their header.
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rhome_msg::{peek_destination, Endpoint, MessageQueue};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Deliveries allowed to be connecting or writing at the same time.
pub const MAX_IN_FLIGHT: usize = 32;

/// Accept connections forever, pushing every non-blank line onto `inbound`.
pub async fn serve_inbound(listener: TcpListener, inbound: MessageQueue) -> Result<()> {
    let local = listener.local_addr().context("listener has no local address")?;
    info!(address = %local, "inbound transport listening");
    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .context("failed to accept inbound connection")?;
        let inbound = inbound.clone();
        tokio::spawn(async move {
            match read_lines(stream, &inbound).await {
                Ok(count) => debug!(%peer, lines = count, "inbound connection closed"),
                Err(err) => warn!(%peer, error = %err, "inbound connection failed"),
            }
        });
    }
}

async fn read_lines(stream: TcpStream, inbound: &MessageQueue) -> std::io::Result<usize> {
    let mut lines = BufReader::new(stream).lines();
    let mut count = 0;
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        inbound.push(line);
        count += 1;
    }
    Ok(count)
}

/// Deliver outbound lines until cancelled. Undeliverable lines are dropped.
///
/// Each line gets its own task, so a slow or unreachable destination only
/// holds up its own lines. Lines to one destination may arrive out of order.
pub async fn pump_outbound(outbound: MessageQueue, poll: Duration, connect_timeout: Duration) {
    let in_flight = Arc::new(Semaphore::new(MAX_IN_FLIGHT));
    loop {
        let Some(line) = outbound.try_pop() else {
            tokio::time::sleep(poll).await;
            continue;
        };
        let Ok(permit) = in_flight.clone().acquire_owned().await else {
            warn!("outbound delivery limiter closed");
            return;
        };
        tokio::spawn(async move {
            match deliver(&line, connect_timeout).await {
                Ok(dest) => debug!(%dest, line = %line, "outbound message delivered"),
                Err(err) => {
                    warn!(line = %line, error = %format!("{err:#}"), "dropping outbound message")
                }
            }
            drop(permit);
        });
    }
}

/// Host and numeric port for a destination; IPv6 literals are passed through unbracketed.
fn connect_target(dest: &Endpoint) -> Result<(&str, u16)> {
    let port = dest
        .port
        .parse::<u16>()
        .with_context(|| format!("destination port `{}` is not a number", dest.port))?;
    Ok((dest.addr.as_str(), port))
}

/// Send one line to the destination in its header.
pub async fn deliver(line: &str, connect_timeout: Duration) -> Result<Endpoint> {
    let dest = peek_destination(line)?;
    let target = connect_target(&dest)?;
    let mut stream = tokio::time::timeout(connect_timeout, TcpStream::connect(target))
        .await
        .with_context(|| format!("timed out connecting to {dest}"))?
        .with_context(|| format!("failed to connect to {dest}"))?;
    stream.write_all(line.as_bytes()).await?;
    stream.write_all(b"\n").await?;
    stream.shutdown().await?;
    Ok(dest)
}

/// Bind the inbound listener.
pub async fn bind(listen: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind inbound listener on {listen}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn wait_for(queue: &MessageQueue, len: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while queue.len() < len {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("lines arrive in time");
    }

    #[tokio::test]
    async fn inbound_lines_land_on_queue() {
        let listener = bind("127.0.0.1:0".parse().expect("addr")).await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let inbound = MessageQueue::new();
        let server = tokio::spawn(serve_inbound(listener, inbound.clone()));

        let mut client = TcpStream::connect(addr).await.expect("connect");
        client
            .write_all(b"1,a,b,c,d,600\r\n\n2,a,b,c,d,600\n")
            .await
            .expect("write");
        client.shutdown().await.expect("shutdown");

        wait_for(&inbound, 2).await;
        assert_eq!(inbound.drain(), vec!["1,a,b,c,d,600", "2,a,b,c,d,600"]);
        server.abort();
    }

    #[tokio::test]
    async fn deliver_writes_to_header_destination() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        let line = format!("101,127.0.0.1,{port},10.0.0.3,27003,601");

        let receiver = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut lines = BufReader::new(stream).lines();
            lines.next_line().await.expect("read")
        });

        let dest = deliver(&line, CONNECT_TIMEOUT).await.expect("delivered");
        assert_eq!(dest, Endpoint::new("127.0.0.1", port.to_string()));
        assert_eq!(receiver.await.expect("join"), Some(line));
    }

    #[test]
    fn connect_target_keeps_ipv6_literals_whole() {
        let dest = Endpoint::new("fe80::1", "27001");
        assert_eq!(connect_target(&dest).expect("numeric port"), ("fe80::1", 27001));
        assert!(connect_target(&Endpoint::new("10.0.0.2", "http")).is_err());
        assert!(connect_target(&Endpoint::new("10.0.0.2", "")).is_err());
    }

    #[tokio::test]
    async fn pump_keeps_delivering_past_failed_lines() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        let outbound = MessageQueue::new();
        outbound.push("1,,,10.0.0.3,27003,600");
        outbound.push("2,127.0.0.1,not-a-port,10.0.0.3,27003,600");
        outbound.push(format!("3,127.0.0.1,{port},10.0.0.3,27003,600"));
        outbound.push(format!("4,127.0.0.1,{port},10.0.0.3,27003,600"));

        let pump = tokio::spawn(pump_outbound(
            outbound.clone(),
            Duration::from_millis(5),
            CONNECT_TIMEOUT,
        ));

        let mut received = Vec::new();
        for _ in 0..2 {
            let (stream, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
                .await
                .expect("delivery arrives in time")
                .expect("accept");
            let mut lines = BufReader::new(stream).lines();
            received.push(lines.next_line().await.expect("read").expect("one line"));
        }
        received.sort();
        assert_eq!(
            received,
            vec![
                format!("3,127.0.0.1,{port},10.0.0.3,27003,600"),
                format!("4,127.0.0.1,{port},10.0.0.3,27003,600"),
            ]
        );
        assert!(outbound.is_empty());
        pump.abort();
    }

    #[tokio::test]
    async fn undeliverable_lines_are_errors() {
        assert!(deliver("too,short", CONNECT_TIMEOUT).await.is_err());
        assert!(deliver("1,,,10.0.0.3,27003,601", CONNECT_TIMEOUT)
            .await
            .is_err());
    }
}
