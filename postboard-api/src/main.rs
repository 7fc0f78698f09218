use postboard_db::{DbClient, MemoryStore, Storage, StorageError};
use postboard_service::{CommentService, PostService, SubscriptionRegistry};
use serde::Deserialize;
use server::ServerState;
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod server;

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("DATABASE_URL must be set when STORAGE is postgres")]
    MissingDatabaseUrl,
    #[error("Error opening storage: {0}")]
    Storage(#[from] StorageError),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
enum StorageKind {
    #[default]
    Memory,
    Postgres,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct Env {
    #[serde(default = "default_server_address")]
    server_address: IpAddr,
    #[serde(default = "default_server_port")]
    server_port: u16,
    #[serde(default)]
    storage: StorageKind,
    database_url: Option<String>,
    #[serde(default = "default_subscription_buffer")]
    subscription_buffer: usize,
}

fn default_server_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_server_port() -> u16 {
    8080
}

fn default_subscription_buffer() -> usize {
    postboard_service::comment::DEFAULT_SUBSCRIPTION_BUFFER
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "postboard_api=debug,\
                postboard_service=debug,\
                postboard_db=debug,\
                postboard_common=debug,\
                tower_http=debug,axum::rejection=trace,sqlx=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn get_env() -> Result<Env, InitError> {
    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            debug!("No .dotenv file found");
        } else {
            return Err(e.into());
        }
    }

    envy::from_env().map_err(InitError::from)
}

async fn open_storage(env: &Env) -> Result<Arc<dyn Storage>, InitError> {
    match env.storage {
        StorageKind::Memory => {
            info!("Using in-memory storage");
            Ok(Arc::new(MemoryStore::default()))
        }
        StorageKind::Postgres => {
            let url = env
                .database_url
                .as_deref()
                .ok_or(InitError::MissingDatabaseUrl)?;
            let client = DbClient::connect(url).await?;
            client.migrate().await?;
            info!("Using postgres storage");
            Ok(Arc::new(client))
        }
    }
}

fn shutdown_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Could not listen for shutdown signal");
        }
        info!("Shutting down");
        token.cancel();
    });
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let env = get_env()?;

    let storage = open_storage(&env).await?;
    let registry = Arc::new(SubscriptionRegistry::new());
    let shutdown = CancellationToken::new();
    let state = ServerState {
        posts: Arc::new(PostService::new(Arc::clone(&storage))),
        comments: Arc::new(
            CommentService::new(storage, registry)
                .with_subscription_buffer(env.subscription_buffer),
        ),
        shutdown: shutdown.clone(),
    };

    let app = server::routes()
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    shutdown_on_ctrl_c(shutdown.clone());

    let server_address = SocketAddr::new(env.server_address, env.server_port);
    let listener = tokio::net::TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    info!(%server_address, "Listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(InitError::TcpServe)?;

    Ok(())
}
