//! Probe: Helix streams endpoint
//!
//! Hits GET https://api.twitch.tv/helix/streams?user_login=<login> and documents:
//! - Response shape and fields
//! - Offline vs live payloads
//! - Thumbnail template markers
//! - Latency over multiple requests
//!
//! Requires TWITCH_CLIENT_ID / TWITCH_CLIENT_SECRET in the environment (or .env).

use std::time::Instant;

use anyhow::Result;
use serde_json::Value;

use twitch_live_notify::{HELIX_API_BASE, TWITCH_ID_BASE};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let client_id = std::env::var("TWITCH_CLIENT_ID")?;
    let client_secret = std::env::var("TWITCH_CLIENT_SECRET")?;
    let login = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "twitchpresents".to_string());

    let client = reqwest::Client::new();

    println!("=== Probe: Helix streams ===");
    println!("Login: {login}");
    println!();

    // 1. Mint an app access token
    println!("--- 1. App access token ---");
    let start = Instant::now();
    let token_body: Value = client
        .post(format!("{TWITCH_ID_BASE}/oauth2/token"))
        .query(&[
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("grant_type", "client_credentials"),
        ])
        .send()
        .await?
        .json()
        .await?;
    println!("Latency: {:?}", start.elapsed());
    let token = token_body
        .get("access_token")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let expires_in = token_body.get("expires_in").and_then(|v| v.as_i64());
    println!("Token length: {}, expires_in: {expires_in:?}", token.len());
    println!();

    // 2. Fetch the stream entry
    println!("--- 2. GET /streams ---");
    let start = Instant::now();
    let resp = client
        .get(format!("{HELIX_API_BASE}/streams"))
        .bearer_auth(&token)
        .header("Client-Id", &client_id)
        .query(&[("user_login", login.as_str())])
        .send()
        .await?;
    let latency = start.elapsed();
    let status = resp.status();
    let body: Value = resp.json().await?;
    println!("Status: {status}");
    println!("Latency: {latency:?}");

    match body.get("data").and_then(|d| d.as_array()) {
        Some(arr) if arr.is_empty() => {
            println!("data is empty: channel is offline (or login unknown)");
        }
        Some(arr) => {
            println!("Entry count: {}", arr.len());
            if let Some(first) = arr.first() {
                println!("\nSample entry (first):");
                println!("{}", serde_json::to_string_pretty(first)?);
                println!("\nFields present:");
                if let Some(obj) = first.as_object() {
                    for key in obj.keys() {
                        println!("  - {key}");
                    }
                }
                if let Some(thumb) = first.get("thumbnail_url").and_then(|v| v.as_str()) {
                    println!(
                        "\nthumbnail_url has template markers: {}",
                        thumb.contains("{width}") && thumb.contains("{height}")
                    );
                }
            }
        }
        None => {
            println!("Response has no data array:");
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }
    println!();

    // 3. Latency over 5 requests
    println!("--- 3. Latency over 5 requests ---");
    let mut latencies = Vec::new();
    for i in 0..5 {
        let start = Instant::now();
        let _ = client
            .get(format!("{HELIX_API_BASE}/streams"))
            .bearer_auth(&token)
            .header("Client-Id", &client_id)
            .query(&[("user_login", login.as_str())])
            .send()
            .await?
            .text()
            .await?;
        let latency = start.elapsed();
        println!("  Request {}: {latency:?}", i + 1);
        latencies.push(latency);
    }
    let avg = latencies.iter().sum::<std::time::Duration>() / latencies.len() as u32;
    println!("  Average: {avg:?}");
    println!();

    println!("=== Probe Complete ===");
    Ok(())
}
