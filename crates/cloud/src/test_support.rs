//! Throwaway HTTP servers for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Accept one connection, drain the request, and reply with `response`
/// (or never reply when `None`). Returns the server's base URL.
pub async fn one_shot_server(response: Option<String>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
            if request_complete(&request) {
                break;
            }
        }
        match response {
            Some(r) => {
                socket.write_all(r.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
            None => tokio::time::sleep(Duration::from_secs(30)).await,
        }
    });
    format!("http://{addr}")
}

fn request_complete(raw: &[u8]) -> bool {
    let text = String::from_utf8_lossy(raw);
    let Some(head_end) = text.find("\r\n\r\n") else {
        return false;
    };
    let content_length = text[..head_end]
        .lines()
        .find_map(|l| {
            let (k, v) = l.split_once(':')?;
            k.eq_ignore_ascii_case("content-length")
                .then(|| v.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    raw.len() >= head_end + 4 + content_length
}

pub fn http_response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\n\
         Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

/// Serve `data` with `Range` support on every connection until the test ends.
/// Returns the file URL and a counter of GET requests served.
pub async fn range_server(data: Vec<u8>) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let data = Arc::new(data);
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let data = data.clone();
            let counter = counter.clone();
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 4096];
                while !request_complete(&request) {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let text = String::from_utf8_lossy(&request).to_string();
                let is_head = text.starts_with("HEAD");
                if !is_head {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                let range = text.lines().find_map(|l| {
                    let (k, v) = l.split_once(':')?;
                    if !k.eq_ignore_ascii_case("range") {
                        return None;
                    }
                    let (a, b) = v.trim().strip_prefix("bytes=")?.split_once('-')?;
                    Some((a.parse::<usize>().ok()?, b.parse::<usize>().ok()?))
                });
                let total = data.len();
                let mut reply = match range {
                    Some((start, end)) if start < total => {
                        let end = end.min(total - 1);
                        let mut head = format!(
                            "HTTP/1.1 206 Partial Content\r\n\
                             Content-Range: bytes {start}-{end}/{total}\r\n\
                             Content-Length: {}\r\nConnection: close\r\n\r\n",
                            end + 1 - start
                        )
                        .into_bytes();
                        if !is_head {
                            head.extend_from_slice(&data[start..=end]);
                        }
                        head
                    }
                    Some(_) => format!(
                        "HTTP/1.1 416 Range Not Satisfiable\r\n\
                         Content-Range: bytes */{total}\r\n\
                         Content-Length: 0\r\nConnection: close\r\n\r\n"
                    )
                    .into_bytes(),
                    None => format!(
                        "HTTP/1.1 200 OK\r\nAccept-Ranges: bytes\r\n\
                         Content-Length: {total}\r\nConnection: close\r\n\r\n"
                    )
                    .into_bytes(),
                };
                if range.is_none() && !is_head {
                    reply.extend_from_slice(&data);
                }
                socket.write_all(&reply).await.ok();
                socket.shutdown().await.ok();
            });
        }
    });
    (format!("http://{addr}/raster.tif"), hits)
}
