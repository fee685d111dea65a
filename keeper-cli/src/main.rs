use anyhow::{Context, Result};
use base64::Engine;
use clap::{Parser, Subcommand, ValueEnum};
use keeper_core::sync::{login_channel, HttpRemote, PushOutcome, Pusher, SyncWorker};
use keeper_core::{
    Authenticator, BlobPayload, CardPayload, ClientConfig, CredentialPayload, LoginMode,
    NotePayload, Secret, SecretRecord, Vault,
};
use rpassword::prompt_password;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

/// Keeper - offline-first secret vault
#[derive(Parser)]
#[command(name = "keeper")]
#[command(about = "Offline-first secret vault with server sync", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "keeper.toml")]
    config: PathBuf,

    /// Server URL override
    #[arg(long)]
    server: Option<String>,

    /// Local database path override
    #[arg(long)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account on the server
    Register { login: String },

    /// Log in online, or offline from the local cache when the server is down
    Login { login: String },

    /// Store a new secret
    Add {
        /// Login whose cached token authorizes the write
        #[arg(short, long)]
        user: String,

        #[command(subcommand)]
        secret: NewSecret,
    },

    /// List live secrets of one kind
    List {
        #[arg(short, long)]
        user: String,
        kind: Kind,
    },

    /// Show one secret in full
    Show {
        #[arg(short, long)]
        user: String,
        kind: Kind,
        id: i64,
    },

    /// Soft-delete a secret
    Delete {
        #[arg(short, long)]
        user: String,
        kind: Kind,
        id: i64,
    },

    /// Push pending changes once
    Push,

    /// Keep pushing changes until interrupted
    Sync {
        /// Sign in first so the worker pushes immediately
        #[arg(short, long)]
        user: Option<String>,
    },
}

#[derive(Subcommand)]
enum NewSecret {
    Credential {
        #[arg(long)]
        resource: String,
        #[arg(long)]
        login: String,
        /// Password (will prompt if not provided)
        #[arg(long)]
        password: Option<String>,
    },
    Note {
        text: String,
    },
    Blob {
        /// File to store
        path: PathBuf,
        /// Name to store it under (defaults to the file name)
        #[arg(long)]
        name: Option<String>,
    },
    Card {
        #[arg(long)]
        number: String,
        #[arg(long)]
        holder: String,
        /// MM/YY
        #[arg(long)]
        expiry: String,
        #[arg(long)]
        cvv: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Credentials,
    Notes,
    Blobs,
    Cards,
}

struct Client {
    config: ClientConfig,
    vault: Vault,
    remote: Arc<HttpRemote>,
}

impl Client {
    fn open(cli: &Cli) -> Result<Self> {
        let mut config = if cli.config.exists() {
            ClientConfig::load(&cli.config)?
        } else {
            ClientConfig::default()
        };
        if let Some(server) = &cli.server {
            config.server_url = server.clone();
        }
        if let Some(database) = &cli.database {
            config.database_path = database.clone();
        }

        let vault = Vault::open(&config.database_path)
            .with_context(|| format!("opening {}", config.database_path.display()))?;
        let remote = Arc::new(HttpRemote::new(&config.server_url, config.request_timeout())?);
        Ok(Self {
            config,
            vault,
            remote,
        })
    }

    fn authenticator(&self, notify: Option<keeper_core::sync::LoginNotifier>) -> Authenticator {
        Authenticator::new(self.vault.database(), self.remote.clone(), notify)
    }

    fn pusher(&self) -> Pusher {
        Pusher::new(self.vault.database(), self.remote.clone())
    }

    fn token(&self, login: &str) -> Result<String> {
        self.vault
            .cached_token(login)
            .with_context(|| format!("no session for {}, run `keeper login {}` first", login, login))
    }
}

fn prompt(label: &str) -> Result<Zeroizing<String>> {
    Ok(Zeroizing::new(prompt_password(label)?))
}

fn print_records<P: Secret>(records: &[SecretRecord<P>], describe: impl Fn(&P) -> String) {
    if records.is_empty() {
        println!("No {} stored", P::KIND);
        return;
    }
    for record in records {
        println!(
            "{:>4}  {}  {}",
            record.id,
            record.updated_at_utc().format("%Y-%m-%d %H:%M"),
            describe(&record.payload)
        );
    }
}

fn mask(value: &str) -> String {
    let visible: String = value
        .chars()
        .filter(|c| !c.is_whitespace())
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("**** {}", visible)
}

async fn sign_in(client: &Client, login: &str, notify: Option<keeper_core::sync::LoginNotifier>) -> Result<()> {
    let password = prompt("Password: ")?;
    let session = client
        .authenticator(notify)
        .sign_in(login, &password)
        .await?;
    match session.mode {
        LoginMode::Online => println!("Logged in as {}", session.login),
        LoginMode::Offline => println!("Server unreachable, logged in offline as {}", session.login),
    }
    Ok(())
}

/// Drive `session` while the worker runs, then stop the worker and wait
/// for its in-flight push, whether or not the session failed.
async fn supervise<F>(shutdown: CancellationToken, worker: JoinHandle<()>, session: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    let outcome = session.await;
    shutdown.cancel();
    worker.await?;
    outcome
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = Client::open(&cli)?;

    match cli.command {
        Commands::Register { login } => {
            let password = prompt("Password: ")?;
            let confirm = prompt("Confirm password: ")?;
            if *password != *confirm {
                anyhow::bail!("passwords do not match");
            }
            let user_id = client.authenticator(None).register(&login, &password).await?;
            println!("Registered {} (id {})", login, user_id);
        }
        Commands::Login { login } => {
            sign_in(&client, &login, None).await?;
        }
        Commands::Add { user, secret } => {
            let token = client.token(&user)?;
            let id = match secret {
                NewSecret::Credential {
                    resource,
                    login,
                    password,
                } => {
                    let password = match password {
                        Some(p) => Zeroizing::new(p),
                        None => prompt("Secret password: ")?,
                    };
                    client
                        .vault
                        .save_credential(&token, &resource, &login, &password)?
                }
                NewSecret::Note { text } => client.vault.save_note(&token, &text)?,
                NewSecret::Blob { path, name } => {
                    let data = std::fs::read(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    let name = match name {
                        Some(n) => n,
                        None => path
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .context("cannot derive a name from the path, pass --name")?,
                    };
                    client.vault.save_blob(&token, &name, data)?
                }
                NewSecret::Card {
                    number,
                    holder,
                    expiry,
                    cvv,
                } => client.vault.save_card(
                    &token,
                    &CardPayload {
                        number,
                        holder,
                        expiry,
                        cvv,
                    },
                )?,
            };
            println!("Saved (id {}), {} change(s) pending", id, client.vault.pending_changes()?);
        }
        Commands::List { user, kind } => {
            let token = client.token(&user)?;
            match kind {
                Kind::Credentials => print_records(
                    &client.vault.list::<CredentialPayload>(&token)?,
                    |c| format!("{}  {}", c.resource, c.login),
                ),
                Kind::Notes => print_records(&client.vault.list::<NotePayload>(&token)?, |n| {
                    n.text.lines().next().unwrap_or_default().to_string()
                }),
                Kind::Blobs => print_records(&client.vault.list::<BlobPayload>(&token)?, |b| {
                    format!("{}  ({} bytes)", b.name, b.data.len())
                }),
                Kind::Cards => print_records(&client.vault.list::<CardPayload>(&token)?, |c| {
                    format!("{}  {}  {}", mask(&c.number), c.holder, c.expiry)
                }),
            }
        }
        Commands::Show { user, kind, id } => {
            let token = client.token(&user)?;
            match kind {
                Kind::Credentials => {
                    let c = client.vault.get::<CredentialPayload>(&token, id)?.payload;
                    println!("Resource: {}\nLogin:    {}\nPassword: {}", c.resource, c.login, c.password);
                }
                Kind::Notes => println!("{}", client.vault.get::<NotePayload>(&token, id)?.payload.text),
                Kind::Blobs => {
                    let b = client.vault.get::<BlobPayload>(&token, id)?.payload;
                    println!("Name: {}\nData (base64):", b.name);
                    println!("{}", base64::engine::general_purpose::STANDARD.encode(&b.data));
                }
                Kind::Cards => {
                    let c = client.vault.get::<CardPayload>(&token, id)?.payload;
                    println!(
                        "Number: {}\nHolder: {}\nExpiry: {}\nCVV:    {}",
                        c.number, c.holder, c.expiry, c.cvv
                    );
                }
            }
        }
        Commands::Delete { user, kind, id } => {
            let token = client.token(&user)?;
            match kind {
                Kind::Credentials => client.vault.delete::<CredentialPayload>(&token, id)?,
                Kind::Notes => client.vault.delete::<NotePayload>(&token, id)?,
                Kind::Blobs => client.vault.delete::<BlobPayload>(&token, id)?,
                Kind::Cards => client.vault.delete::<CardPayload>(&token, id)?,
            }
            println!("Deleted {}", id);
        }
        Commands::Push => match client.pusher().push_data().await? {
            PushOutcome::NothingToSync => println!("Nothing to sync"),
            PushOutcome::Pushed(report) => {
                for group in &report.groups {
                    match &group.error {
                        Some(e) => println!("{}: failed ({})", group.kind, e),
                        None => println!(
                            "{}: {}/{} acknowledged",
                            group.kind, group.acknowledged, group.sent
                        ),
                    }
                }
                println!("{} change(s) still pending", client.vault.pending_changes()?);
            }
        },
        Commands::Sync { user } => {
            let (notifier, events) = login_channel();
            let worker = SyncWorker::new(client.pusher(), client.config.sync_interval(), events);
            let shutdown = CancellationToken::new();
            let handle = tokio::spawn(worker.run(shutdown.clone()));

            supervise(shutdown, handle, async {
                if let Some(login) = user {
                    sign_in(&client, &login, Some(notifier)).await?;
                }
                info!(server = %client.config.server_url, "Syncing, press Ctrl-C to stop");
                tokio::signal::ctrl_c().await?;
                info!("Received shutdown signal");
                anyhow::Ok(())
            })
            .await?;
            println!("{} change(s) still pending", client.vault.pending_changes()?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn failed_session_still_stops_the_worker() {
        let shutdown = CancellationToken::new();
        let stopped = Arc::new(AtomicBool::new(false));

        let token = shutdown.clone();
        let flag = stopped.clone();
        let worker = tokio::spawn(async move {
            token.cancelled().await;
            flag.store(true, Ordering::SeqCst);
        });

        let result = supervise(shutdown.clone(), worker, async {
            Err::<(), _>(anyhow::anyhow!("wrong password"))
        })
        .await;

        assert!(result.is_err());
        assert!(shutdown.is_cancelled());
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[test]
    fn card_numbers_are_masked() {
        assert_eq!(mask("4111 1111 1111 1234"), "**** 1234");
    }
}
