use std::{collections::HashSet, io::BufRead};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use secrettrails::{
    AppError, Session,
    auth::GoogleOAuth,
    chat::dice,
    config::{AppConfig, AuthConfig},
    db::{ChatMessage, MessageKind, Role},
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Parser)]
#[command(name = "secrettrails", about = "Campaign companion for tabletop role-playing games")]
struct Cli {
    #[arg(long, global = true)]
    email: Option<String>,
    #[arg(long, global = true)]
    password: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create an account; new accounts start as players.
    Register,
    /// Sign in through Google in the browser.
    GoogleLogin,
    #[command(flatten)]
    SignedIn(SignedIn),
}

/// Commands that sign in with `--email` and `--password` first.
#[derive(Debug, Subcommand)]
enum SignedIn {
    /// List the campaigns you run or have joined.
    Campaigns,
    CreateCampaign { name: String },
    Join { code: String },
    Say { campaign: String, text: String },
    Roll { campaign: String, notation: String },
    /// Print the chat of a campaign until interrupted.
    Tail { campaign: String },
    /// Make yourself a game master.
    Promote,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    let db = config.open_store().await?;
    let session = Session::new(db, config.auth_provider()?);
    session.auth.init_auth_listener();

    match cli.command {
        Command::Register => {
            let (email, password) = credentials(&cli.email, &cli.password)?;
            let user = session.auth.register(email, password).await?;
            println!("registered {} as {}", user.uid, session.profiles.role().unwrap_or(Role::Player));
        }
        Command::GoogleLogin => {
            let google = config
                .google_oauth()?
                .context("GOOGLE_CLIENT_ID, GOOGLE_CLIENT_SECRET and GOOGLE_REDIRECT_URL must be set")?;
            google_login(&session, &google).await?;
        }
        Command::SignedIn(command) => {
            sign_in(&session, &config, &cli.email, &cli.password).await?;
            run(&session, command).await?;
        }
    }

    session.logout().await?;
    Ok(())
}

fn credentials<'a>(email: &'a Option<String>, password: &'a Option<String>) -> anyhow::Result<(&'a str, &'a str)> {
    match (email, password) {
        (Some(email), Some(password)) => Ok((email.as_str(), password.as_str())),
        _ => bail!("--email and --password are required"),
    }
}

/// Local accounts only live as long as the process, so they are created on first use.
async fn sign_in(
    session: &Session,
    config: &AppConfig,
    email: &Option<String>,
    password: &Option<String>,
) -> anyhow::Result<()> {
    let (email, password) = credentials(email, password)?;
    match session.auth.login(email, password).await {
        Ok(_) => Ok(()),
        Err(err) if config.auth == AuthConfig::Local => {
            info!(%err, "no local account yet, registering");
            session.auth.register(email, password).await?;
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

async fn google_login(session: &Session, google: &GoogleOAuth) -> anyhow::Result<()> {
    let pending = google.begin();
    println!("open {}", pending.authorize_url);
    println!("then paste the `state` and `code` query parameters of the redirect, one per line");

    let lines = tokio::task::spawn_blocking(|| {
        std::io::stdin()
            .lock()
            .lines()
            .take(2)
            .collect::<Result<Vec<_>, _>>()
    })
    .await??;
    let [state, code] = lines.as_slice() else {
        bail!("expected a state and a code");
    };

    let credential = google.finish(pending, state.trim(), code.trim()).await?;
    let user = session.auth.login_with_google(&credential).await?;
    println!("signed in as {}", user.email.as_deref().unwrap_or(user.uid.as_str()));
    Ok(())
}

async fn run(session: &Session, command: SignedIn) -> anyhow::Result<()> {
    let actor = session.actor()?;
    match command {
        SignedIn::Campaigns => {
            session.campaigns.subscribe_to_all_campaigns(&actor.user_id).await?;
            for campaign in session.campaigns.all_my_campaigns() {
                let seat = if campaign.master_id == actor.user_id { "gm" } else { "player" };
                println!("{}\t{}\t{}\t{}", campaign.id, campaign.join_code, seat, campaign.name);
            }
        }
        SignedIn::CreateCampaign { name } => {
            let campaign = session.campaigns.create_campaign(&actor, &name).await?;
            println!("created {} with join code {}", campaign.id, campaign.join_code);
        }
        SignedIn::Join { code } => {
            let campaign = session.campaigns.join_campaign(&actor, &code).await?;
            println!("joined {} ({})", campaign.name, campaign.id);
        }
        SignedIn::Say { campaign, text } => {
            session.campaigns.get_campaign(&campaign).await?;
            session.chat.send_message(&actor, &campaign, &text, MessageKind::Message).await?;
        }
        SignedIn::Roll { campaign, notation } => {
            session.campaigns.get_campaign(&campaign).await?;
            let roll = dice::roll(&notation, &mut rand::rng())?;
            session.chat.send_dice_roll(&actor, &campaign, &roll).await?;
            println!("{} = {} {:?}", roll.notation, roll.result, roll.details);
        }
        SignedIn::Tail { campaign } => tail(session, &campaign).await?,
        SignedIn::Promote => match session.profiles.set_role(&actor.user_id, Role::Gm.as_str()).await {
            Ok(_) => println!("you are now a game master"),
            Err(AppError::InvalidRole(role)) => bail!("rejected role {role}"),
            Err(err) => return Err(err.into()),
        },
    }
    Ok(())
}

async fn tail(session: &Session, campaign_id: &str) -> anyhow::Result<()> {
    let campaign = session.campaigns.get_campaign(campaign_id).await?;
    session.chat.subscribe_to_chat(campaign_id).await?;
    println!("-- {} --", campaign.name);

    let mut seen = HashSet::new();
    let mut rx = session.chat.live().watch();
    loop {
        let messages = rx.borrow_and_update().clone();
        for message in messages {
            if seen.insert(message.id.clone()) {
                print_message(&message);
            }
        }

        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    warn!("chat feed closed");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.chat.unsubscribe_from_chat();
    Ok(())
}

fn print_message(message: &ChatMessage) {
    match message.kind {
        MessageKind::System => println!("* {}", message.text),
        _ => println!("<{}> {}", message.user_name, message.text),
    }
}
