use anyhow::Context;
use clap::{Parser, Subcommand};
use guestbook::{
    config::AppConfig,
    db::{self, migrate, Migrator},
    repositories::user_repository::SqliteUserRepository,
    services::{
        email_service::create_mailer,
        mail_queue::{MailQueue, TracingDeliveryObserver},
        session_service::SessionService,
        user_service::{SignupRequest, UserService},
    },
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "guestbook-cli")]
#[command(about = "Operator tool for the guestbook database", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending migrations
    Migrate {
        /// Read scripts from this directory instead of the built-in set
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Show applied migrations
    Status,

    /// User management commands
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Session maintenance
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a new user
    Create {
        /// Email address
        #[arg(short, long)]
        email: String,

        /// Password (will prompt if not provided)
        #[arg(short, long)]
        password: Option<String>,

        /// Mark email as verified
        #[arg(long)]
        verified: bool,
    },

    /// List all users
    List {
        /// Maximum number of users to display
        #[arg(short, long, default_value_t = 100)]
        limit: i64,

        /// Offset for pagination
        #[arg(short = 'o', long, default_value_t = 0)]
        offset: i64,
    },

    /// Delete a user and, through cascade, their sessions
    Delete {
        /// Email address of the user to delete
        #[arg(short, long)]
        email: String,
    },

    /// Verify a user's email
    Verify {
        /// Email address of the user to verify
        #[arg(short, long)]
        email: String,
    },
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Delete expired sessions
    Purge,

    /// Log a user out everywhere
    Revoke {
        /// Email address of the user
        #[arg(short, long)]
        email: String,
    },
}

fn get_password(prompt: &str) -> anyhow::Result<String> {
    use std::io::{self, Write};
    print!("{}: ", prompt);
    io::stdout().flush()?;

    Ok(rpassword::read_password()?)
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("❌ {}", message);
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    // Connect to database
    let pool = db::create_pool(&config.database_url)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_url))?;

    let migrator = match &cli.command {
        Commands::Migrate { dir: Some(dir) } => Migrator::from_dir(dir)?,
        _ => Migrator::embedded(),
    };
    let report = migrator
        .run(&pool)
        .await
        .context("Migration failed")?;

    match cli.command {
        Commands::Migrate { .. } => {
            if report.applied.is_empty() {
                println!("ℹ️  Schema already at version {}", report.starting_version);
            } else {
                println!(
                    "✅ Applied {:?}, schema now at version {}",
                    report.applied,
                    report.final_version()
                );
            }
        }

        Commands::Status => {
            println!("Current version: {}", migrate::current_version(&pool).await?);
            println!("{:<10} {:<25}", "Version", "Applied at");
            println!("{}", "-".repeat(35));
            for record in migrate::applied(&pool).await? {
                println!(
                    "{:<10} {:<25}",
                    record.version,
                    record.applied_at.as_deref().unwrap_or("N/A")
                );
            }
        }

        Commands::User { command } => {
            let (mail_queue, mail_workers) = MailQueue::spawn(
                create_mailer(),
                Arc::new(TracingDeliveryObserver),
                config.mail_queue_capacity,
                1,
            );
            let user_repository = Arc::new(SqliteUserRepository::new(pool.clone()));
            let user_service = UserService::new(user_repository, mail_queue, &config.base_url);

            run_user_command(&user_service, command).await?;

            // Let any verification mail go out before exiting.
            drop(user_service);
            mail_workers.join().await;
        }

        Commands::Session { command } => {
            let session_service = SessionService::new(pool.clone());
            match command {
                SessionCommands::Purge => {
                    let purged = session_service.purge_expired().await?;
                    println!("✅ Purged {} expired session(s)", purged);
                }
                SessionCommands::Revoke { email } => {
                    let user_id = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE email = ?")
                        .bind(&email)
                        .fetch_optional(&pool)
                        .await?
                        .unwrap_or_else(|| fail(format!("User '{}' not found", email)));
                    let revoked = session_service.destroy_all_for_user(user_id).await?;
                    println!("✅ Revoked {} session(s) for '{}'", revoked, email);
                }
            }
        }
    }

    pool.close().await;
    Ok(())
}

async fn run_user_command(
    user_service: &UserService,
    command: UserCommands,
) -> anyhow::Result<()> {
    match command {
        UserCommands::Create {
            email,
            password,
            verified,
        } => {
            let password = match password {
                Some(pw) => pw,
                None => {
                    let password = get_password("Password")?;
                    if password != get_password("Confirm password")? {
                        fail("Passwords do not match");
                    }
                    password
                }
            };

            let registration = user_service
                .register(SignupRequest {
                    email: email.clone(),
                    password,
                })
                .await
                .unwrap_or_else(|err| fail(format!("Failed to create user: {}", err)));

            if verified {
                user_service.mark_verified(registration.user.id).await?;
            }

            println!("✅ User created successfully!");
            println!("  ID: {}", registration.user.id);
            println!("  Email: {}", registration.user.email);
            println!("  Verified: {}", verified);
        }

        UserCommands::List { limit, offset } => {
            let users = user_service
                .list_users(Some(limit), Some(offset))
                .await
                .unwrap_or_else(|err| fail(format!("Failed to list users: {}", err)));

            if users.is_empty() {
                println!("No users found.");
            } else {
                println!(
                    "{:<5} {:<40} {:<10} {:<20}",
                    "ID", "Email", "Verified", "Created"
                );
                println!("{}", "-".repeat(75));
                for user in users {
                    println!(
                        "{:<5} {:<40} {:<10} {:<20}",
                        user.id,
                        user.email,
                        if user.is_verified() { "Yes" } else { "No" },
                        user.created_at.as_deref().unwrap_or("N/A")
                    );
                }
            }
        }

        UserCommands::Delete { email } => {
            let user = find_user(user_service, &email).await;
            match user_service.delete_user(user.id).await {
                Ok(()) => println!("✅ User '{}' deleted successfully!", email),
                Err(err) => fail(format!("Failed to delete user: {}", err)),
            }
        }

        UserCommands::Verify { email } => {
            let user = find_user(user_service, &email).await;
            if user.is_verified() {
                println!("ℹ️  User '{}' is already verified", email);
            } else {
                match user_service.mark_verified(user.id).await {
                    Ok(()) => println!("✅ User '{}' email verified successfully!", email),
                    Err(err) => fail(format!("Failed to verify user: {}", err)),
                }
            }
        }
    }

    Ok(())
}

async fn find_user(user_service: &UserService, email: &str) -> guestbook::models::User {
    match user_service.find_user_by_email(email).await {
        Ok(Some(user)) => user,
        Ok(None) => fail(format!("User '{}' not found", email)),
        Err(err) => fail(format!("Failed to find user: {}", err)),
    }
}
