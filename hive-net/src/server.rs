//! # TCP Service
//!
//! Accept peer connections, parse command frames, and dispatch them to the
//! registered groups. Lookups and inserts run on the blocking pool because
//! origin loaders may block for arbitrarily long.

use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task;
use tracing::{info, warn};

use hive_core::{get_group, ByteView, Group};

use crate::frame::{encode_bulk, encode_error, encode_simple, FrameReader};

/// Serves the peer protocol on `listener` until the process exits.
pub async fn serve(listener: TcpListener) -> io::Result<()> {
    info!(addr = %listener.local_addr()?, "peer service listening");
    loop {
        let (stream, remote) = listener.accept().await?;
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream).await {
                warn!(%remote, error = %err, "connection ended with error");
            }
        });
    }
}

/// Handles a single peer connection until it closes.
pub async fn handle_connection(stream: TcpStream) -> io::Result<()> {
    let mut stream = stream;
    let mut buffer = BytesMut::with_capacity(8 * 1024);
    let mut reader = FrameReader::new();

    loop {
        let bytes = stream.read_buf(&mut buffer).await?;
        if bytes == 0 {
            break;
        }

        loop {
            match reader.parse(&mut buffer) {
                Ok(Some(args)) => {
                    let response = dispatch(args).await;
                    stream.write_all(&response).await?;
                }
                Ok(None) => break,
                Err(_) => {
                    stream.write_all(&encode_error("protocol error")).await?;
                    return Ok(());
                }
            }
        }
    }

    Ok(())
}

async fn dispatch(args: Vec<Vec<u8>>) -> Vec<u8> {
    let Some(command) = args.first() else {
        return encode_error("empty command");
    };

    if command.eq_ignore_ascii_case(b"GET") {
        return handle_get(&args).await;
    }
    if command.eq_ignore_ascii_case(b"PUT") {
        return handle_put(args).await;
    }
    if command.eq_ignore_ascii_case(b"PING") {
        return handle_ping(&args);
    }
    if command.eq_ignore_ascii_case(b"STATS") {
        return handle_stats(&args);
    }

    encode_error("unknown command")
}

/// Resolves `GET <group> <key>` arguments to a live group, or replies with
/// the error the caller should see.
fn resolve_group(name: &[u8]) -> Result<std::sync::Arc<Group>, Vec<u8>> {
    let Ok(name) = std::str::from_utf8(name) else {
        return Err(encode_error("group name must be utf-8"));
    };
    get_group(name).ok_or_else(|| encode_error(&format!("no such group: {name}")))
}

async fn handle_get(args: &[Vec<u8>]) -> Vec<u8> {
    if args.len() != 3 {
        return encode_error("wrong number of arguments for GET");
    }
    let group = match resolve_group(&args[1]) {
        Ok(group) => group,
        Err(response) => return response,
    };
    let Ok(key) = std::str::from_utf8(&args[2]) else {
        return encode_error("key must be utf-8");
    };

    let key = key.to_owned();
    match task::spawn_blocking(move || group.get(&key)).await {
        Ok(Ok(view)) => encode_bulk(&view.into_bytes()),
        Ok(Err(err)) => encode_error(&err.to_string()),
        Err(_) => encode_error("lookup task failed"),
    }
}

async fn handle_put(mut args: Vec<Vec<u8>>) -> Vec<u8> {
    if args.len() != 4 {
        return encode_error("wrong number of arguments for PUT");
    }
    let value = args.swap_remove(3);
    let group = match resolve_group(&args[1]) {
        Ok(group) => group,
        Err(response) => return response,
    };
    let Ok(key) = std::str::from_utf8(&args[2]) else {
        return encode_error("key must be utf-8");
    };

    let key = key.to_owned();
    match task::spawn_blocking(move || group.add(&key, ByteView::from(value))).await {
        Ok(Ok(())) => encode_simple("OK"),
        Ok(Err(err)) => encode_error(&err.to_string()),
        Err(_) => encode_error("insert task failed"),
    }
}

fn handle_ping(args: &[Vec<u8>]) -> Vec<u8> {
    match args.len() {
        1 => encode_simple("PONG"),
        2 => encode_bulk(&args[1]),
        _ => encode_error("wrong number of arguments for PING"),
    }
}

fn handle_stats(args: &[Vec<u8>]) -> Vec<u8> {
    if args.len() != 2 {
        return encode_error("wrong number of arguments for STATS");
    }
    let group = match resolve_group(&args[1]) {
        Ok(group) => group,
        Err(response) => return response,
    };

    let stats = group.stats();
    let (entries, bytes) = group.cache_stats();
    let text = format!(
        "name:{}\nentries:{entries}\nbytes:{bytes}\ngets:{}\nhits:{}\nloads:{}\n\
         local_loads:{}\nlocal_load_errors:{}\npeer_loads:{}\npeer_errors:{}\n",
        group.name(),
        stats.gets,
        stats.hits,
        stats.loads,
        stats.local_loads,
        stats.local_load_errors,
        stats.peer_loads,
        stats.peer_errors,
    );
    encode_bulk(text.as_bytes())
}
