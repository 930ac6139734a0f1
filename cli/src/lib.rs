mod args;

pub use args::{Args, Commands, CreateSuperuserArgs, SeedPackagesArgs};
use chrono::Utc;
use clap::Parser;
use common::{Database, PackageInput, SweepReport, User};

/// Runs the CLI command parser and executes the selected command.
/// Returns true if a CLI command was handled, false otherwise.
pub async fn run_cli() -> bool {
    let args = Args::parse();
    let Some(command) = &args.command else {
        return false;
    };

    let db = match connect().await {
        Ok(db) => db,
        Err(e) => {
            eprintln!("{e:#}");
            return true;
        }
    };

    match command {
        Commands::CreateSuperuser(superuser_args) => {
            match create_superuser(
                &db,
                &superuser_args.username,
                &superuser_args.email,
                &superuser_args.password,
            )
            .await
            {
                Ok(user) => println!("Superuser '{}' created successfully.", user.username),
                Err(e) => eprintln!("Failed to create superuser: {e:#}"),
            }
        }
        Commands::SeedPackages(seed_args) => {
            let path = seed_args
                .file
                .clone()
                .or_else(|| std::env::var("PACKAGES_YAML").ok());
            match path {
                Some(path) => match seed_packages(&db, &path).await {
                    Ok(added) => println!("Seeded {} listing package(s) from {}", added, path),
                    Err(e) => eprintln!("Failed to seed packages: {e:#}"),
                },
                None => eprintln!("Error: pass --file or set PACKAGES_YAML"),
            }
        }
        Commands::Sweep => match sweep(&db).await {
            Ok(report) => println!(
                "Expired {} booking(s) and {} listing(s), skipped {}",
                report.bookings_expired, report.listings_expired, report.conflicts
            ),
            Err(e) => eprintln!("Sweep failed: {e:#}"),
        },
    }
    true
}

async fn connect() -> anyhow::Result<Database> {
    let database_url =
        std::env::var("DATABASE_URL").map_err(|_| anyhow::anyhow!("DATABASE_URL not set"))?;
    Database::new(&database_url).await
}

/// Creates a superuser: validates input, hashes password, checks for duplicates, and saves to DB.
async fn create_superuser(
    db: &Database,
    username: &str,
    email: &str,
    password: &str,
) -> anyhow::Result<User> {
    let user = User::new(username, email, password, true)
        .map_err(|e| anyhow::anyhow!("Validation error: {e}"))?;

    if db.user_exists(username, email).await? {
        return Err(anyhow::anyhow!(
            "A user with username '{}' or email '{}' already exists.",
            username,
            email
        ));
    }

    db.create_user(&user)
        .await
        .map_err(|e| anyhow::anyhow!("Database error: {e:#}"))
}

async fn seed_packages(db: &Database, path: &str) -> anyhow::Result<usize> {
    let packages = PackageInput::from_yaml_file(path).await?;
    db.seed_packages(&packages).await
}

async fn sweep(db: &Database) -> anyhow::Result<SweepReport> {
    let report = db.sweep(Utc::now().naive_utc()).await?;
    log::info!("Sweep finished: {:?}", report);
    Ok(report)
}
