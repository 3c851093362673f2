use std::{collections::HashSet, io::BufRead, time::Duration};

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use client::RelayClient;
use relay_core::types::NowPlaying;
use rspotify::{prelude::*, AuthCodeSpotify, Credentials, OAuth};

mod client;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct TopLevel {
    #[clap(subcommand)]
    command: Subcommands,
}

#[derive(Subcommand, Debug)]
enum Subcommands {
    /// Walk through the login once and print the refresh token the relay
    /// expects in MY_SPOTIFY_REFRESH_TOKEN
    Token {
        #[clap(long, env = "SPOTIFY_CLIENT_ID")]
        client_id: String,
        #[clap(long, env = "SPOTIFY_CLIENT_SECRET")]
        client_secret: String,
        #[clap(long, env = "SPOTIFY_REDIRECT_URI", default_value = "http://localhost:8090/callback")]
        redirect_uri: String,
    },

    /// Follow a running relay and print every track change
    Watch {
        #[clap(short, long, default_value = "localhost:8090")]
        /// host:port of the relay
        address: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = TopLevel::parse();

    match args.command {
        Subcommands::Token {
            client_id,
            client_secret,
            redirect_uri,
        } => token(&client_id, &client_secret, redirect_uri).await,
        Subcommands::Watch { address } => watch(&address).await,
    }
}

async fn token(client_id: &str, client_secret: &str, redirect_uri: String) -> anyhow::Result<()> {
    let scopes = ["user-read-currently-playing", "user-read-playback-state"];
    let oauth = OAuth {
        redirect_uri,
        scopes: HashSet::from(scopes.map(|s| s.to_owned())),
        ..Default::default()
    };
    let spotify = AuthCodeSpotify::new(Credentials::new(client_id, client_secret), oauth);

    let url = spotify.get_authorize_url(false)?;
    println!("Open this URL and approve access:\n\n  {}\n", url);
    println!("Then paste the full URL you were redirected to:");

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let code = spotify
        .parse_response_code(line.trim())
        .ok_or_else(|| anyhow!("no code found in the pasted URL"))?;

    spotify.request_token(&code).await?;
    let token = spotify
        .token
        .lock()
        .await
        .map_err(|_| anyhow!("token store is unavailable"))?
        .clone()
        .context("no token was issued")?;
    let refresh_token = token.refresh_token.context("no refresh token was issued")?;

    println!("\nMY_SPOTIFY_REFRESH_TOKEN={}", refresh_token);
    Ok(())
}

async fn watch(address: &str) -> anyhow::Result<()> {
    let client = RelayClient::new(address);
    let mut last: Option<NowPlaying> = None;

    loop {
        match client.poll().await {
            Ok(now) => {
                if last.as_ref().map_or(true, |last| !same_track(last, &now)) {
                    print_now_playing(&now);
                    last = Some(now);
                }
            }
            Err(err) if err.is_fatal() => return Err(err.into()),
            Err(err) => {
                eprintln!("{}", err);
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
    }
}

/// Progress moves on every poll; only the track and play state count.
fn same_track(a: &NowPlaying, b: &NowPlaying) -> bool {
    a.current_track == b.current_track && a.currently_playing == b.currently_playing
}

fn print_now_playing(now: &NowPlaying) {
    let state = if now.currently_playing { "▶" } else { "⏸" };
    println!("{} {}", state, now.current_track);
    if let Some(link) = &now.spotify_link {
        println!("  {}", link);
    }
}
