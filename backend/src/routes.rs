use std::{fmt, sync::Arc};

use relay_core::types::{ErrorFrame, Frame, Message, NowPlaying, ShareRequest, TrackFeedItem};
use rocket::{
    fairing::{Fairing, Info, Kind},
    futures::{Sink, SinkExt, Stream, StreamExt},
    http::Header,
    response::{
        stream::{Event, EventStream},
        Redirect,
    },
    serde::json::Json,
    Build, Either, Request, Response, Rocket, Route, Shutdown, State,
};
use rocket_ws::{Channel, WebSocket};
use tokio::sync::mpsc::Receiver;
use tracing::{debug, info, warn};

use crate::{
    authentication::{AuthState, CronAuthorized, CronSecret},
    config::RelayConfig,
    error::RelayError,
    longpoll,
    persistence::{model::User, Store},
    relay::Relay,
    sharing::{self, UpdateSummary},
};

/// Cache policy of the stateless single-shot endpoint.
pub const SINGLE_SHOT_CACHE_CONTROL: &str = "public, max-age=15, s-maxage=15";

#[derive(Responder)]
pub struct CachedSnapshot {
    inner: Json<NowPlaying>,
    cache_control: Header<'static>,
}

impl CachedSnapshot {
    fn new(value: NowPlaying) -> Self {
        Self {
            inner: Json(value),
            cache_control: Header::new("Cache-Control", SINGLE_SHOT_CACHE_CONTROL),
        }
    }
}

#[get("/")]
fn index() -> Json<Message> {
    Json(Message::new("Now Listening API"))
}

/// Server-sent events: one `data:` frame per change, until the session ends.
#[get("/now-playing")]
fn now_playing_stream(relay: &State<Arc<Relay>>, mut shutdown: Shutdown) -> EventStream![] {
    let (mut frames, cancel) = relay.open_session();
    EventStream! {
        // dropping the stream (client gone) cancels the session
        let _session = cancel.drop_guard();
        loop {
            let frame = tokio::select! {
                frame = frames.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
                _ = &mut shutdown => break,
            };
            yield Event::json(&frame);
        }
    }
}

/// WebSocket variant of the push stream: one JSON text message per change.
#[get("/now-playing/ws")]
fn now_playing_socket(ws: WebSocket, relay: &State<Arc<Relay>>) -> Channel<'static> {
    let relay = Arc::clone(relay.inner());
    ws.channel(move |stream| {
        Box::pin(async move {
            let (mut frames, cancel) = relay.open_session();
            let _session = cancel.drop_guard();

            let (mut outgoing, mut incoming) = stream.split::<rocket_ws::Message>();
            pump_frames(&mut frames, &mut outgoing, &mut incoming).await
        })
    })
}

/// Forwards session frames to a socket as JSON text until the session ends
/// or the peer closes its side.
async fn pump_frames<Si, St, E>(
    frames: &mut Receiver<Frame>,
    outgoing: &mut Si,
    incoming: &mut St,
) -> Result<(), Si::Error>
where
    Si: Sink<rocket_ws::Message> + Unpin,
    St: Stream<Item = Result<rocket_ws::Message, E>> + Unpin,
    E: fmt::Display,
{
    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else { break };
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!("could not encode frame: {}", err);
                        break;
                    }
                };
                outgoing.send(rocket_ws::Message::Text(text)).await?;
            }
            message = incoming.next() => match message {
                None | Some(Ok(rocket_ws::Message::Close(_))) => break,
                Some(Err(err)) => {
                    debug!("socket closed with error: {}", err);
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    Ok(())
}

/// Bounded long-poll: answers on the next change or when the wait budget runs out.
#[get("/now-playing/poll")]
async fn now_playing_poll(relay: &State<Arc<Relay>>) -> Result<Json<NowPlaying>, RelayError> {
    let snapshot = longpoll::wait_for_change(relay).await?;
    Ok(Json(NowPlaying::from(&snapshot)))
}

#[get("/now-playing/current")]
async fn now_playing_current(
    relay: &State<Arc<Relay>>,
) -> Result<CachedSnapshot, RelayError> {
    relay.ensure_configured()?;
    let snapshot = relay.current_snapshot().await?;
    Ok(CachedSnapshot::new(NowPlaying::from(&snapshot)))
}

#[get("/auth/login")]
fn auth_login(auth: &State<AuthState>) -> Result<Redirect, RelayError> {
    let url = auth.flow()?.authorize_url()?;
    Ok(Redirect::to(url))
}

#[get("/auth/callback?<code>")]
async fn auth_callback(
    code: &str,
    auth: &State<AuthState>,
    store: &State<Store>,
) -> Result<Either<Redirect, Json<Message>>, RelayError> {
    let authorized = auth.flow()?.exchange_code(code).await?;

    let user = match store.get_user_by_spotify_id(&authorized.spotify_id).await? {
        Some(user) => user,
        None => {
            info!("registering user {}", authorized.spotify_id);
            store
                .create_user(
                    &authorized.spotify_id,
                    &authorized.display_name,
                    authorized.profile_pic_url.as_deref(),
                )
                .await?
        }
    };

    store
        .update_token(
            user.id,
            &authorized.access_token,
            &authorized.refresh_token,
            authorized.expires_at,
        )
        .await?;

    match &auth.frontend_url {
        Some(frontend) => {
            let url = reqwest::Url::parse_with_params(
                frontend,
                &[
                    ("spotify_id", user.spotify_id.as_str()),
                    ("display_name", user.display_name.as_str()),
                ],
            )
            .map_err(|err| RelayError::Configuration(format!("invalid FRONTEND_URL: {}", err)))?;
            Ok(Either::Left(Redirect::to(url.to_string())))
        }
        None => Ok(Either::Right(Json(Message::new("Successfully authenticated.")))),
    }
}

async fn find_user(store: &Store, spotify_id: &str) -> Result<User, RelayError> {
    store
        .get_user_by_spotify_id(spotify_id)
        .await?
        .ok_or_else(|| RelayError::NotFound("User not found.".to_owned()))
}

#[post("/share/start", data = "<request>")]
async fn share_start(
    request: Json<ShareRequest>,
    store: &State<Store>,
) -> Result<Json<Message>, RelayError> {
    let user = find_user(store, &request.spotify_id).await?;
    store.start_sharing(user.id).await?;
    Ok(Json(Message::new("Sharing started.")))
}

#[post("/share/stop", data = "<request>")]
async fn share_stop(
    request: Json<ShareRequest>,
    store: &State<Store>,
) -> Result<Json<Message>, RelayError> {
    let user = find_user(store, &request.spotify_id).await?;
    store.stop_sharing(user.id).await?;
    Ok(Json(Message::new("Sharing stopped.")))
}

#[get("/feed")]
async fn feed(store: &State<Store>) -> Result<Json<Vec<TrackFeedItem>>, RelayError> {
    Ok(Json(sharing::feed(store).await?))
}

#[post("/tasks/update-playing")]
async fn update_playing_task(
    _authorized: CronAuthorized,
    store: &State<Store>,
    relay: &State<Arc<Relay>>,
) -> Result<Json<UpdateSummary>, RelayError> {
    let summary = sharing::update_playing(store, relay.provider()).await?;
    Ok(Json(summary))
}

#[options("/<_..>")]
fn preflight() {}

#[catch(401)]
fn unauthorized() -> Json<ErrorFrame> {
    Json(ErrorFrame::new("unauthorized", "Unauthorized."))
}

#[catch(404)]
fn not_found() -> Json<ErrorFrame> {
    Json(ErrorFrame::new("not_found", "Not found."))
}

pub fn relay_routes() -> Vec<Route> {
    routes![
        index,
        now_playing_stream,
        now_playing_socket,
        now_playing_poll,
        now_playing_current,
        preflight,
    ]
}

pub fn sharing_routes() -> Vec<Route> {
    routes![
        auth_login,
        auth_callback,
        share_start,
        share_stop,
        feed,
        update_playing_task,
    ]
}

/// Adds permissive CORS headers to every response.
pub struct Cors;

#[rocket::async_trait]
impl Fairing for Cors {
    fn info(&self) -> Info {
        Info {
            name: "CORS headers",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, _request: &'r Request<'_>, response: &mut Response<'r>) {
        response.set_header(Header::new("Access-Control-Allow-Origin", "*"));
        response.set_header(Header::new(
            "Access-Control-Allow-Methods",
            "GET, POST, OPTIONS",
        ));
        response.set_header(Header::new("Access-Control-Allow-Headers", "*"));
    }
}

/// Assembles the server. Sharing, login and the batch task need a store and
/// are only mounted when one is available.
pub fn build(config: &RelayConfig, relay: Arc<Relay>, store: Option<Store>) -> Rocket<Build> {
    let rocket = rocket::build()
        .manage(relay)
        .manage(CronSecret(config.cron_secret.clone()))
        .attach(Cors)
        .mount("/api", relay_routes())
        .register("/", catchers![unauthorized, not_found]);

    match store {
        Some(store) => rocket
            .manage(store)
            .manage(AuthState::from_config(config))
            .mount("/api", sharing_routes()),
        None => rocket,
    }
}
