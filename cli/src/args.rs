use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "Car Market CLI - manage admin users, packages and housekeeping")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a superuser (admin) account
    CreateSuperuser(CreateSuperuserArgs),

    /// Load listing packages from a YAML file
    ///
    /// Packages whose slug already exists are skipped, so the command can be
    /// run repeatedly against the same database.
    SeedPackages(SeedPackagesArgs),

    /// Run a single expiry pass over bookings and listings, then exit
    Sweep,
}

#[derive(ClapArgs, Debug)]
pub struct CreateSuperuserArgs {
    /// Username for the superuser
    #[arg(short, long, help = "Username for the superuser")]
    pub username: String,

    /// Email address for the superuser
    #[arg(short, long, help = "Email address for the superuser")]
    pub email: String,

    /// Password for the superuser
    #[arg(short, long, help = "Password for the superuser")]
    pub password: String,
}

#[derive(ClapArgs, Debug)]
pub struct SeedPackagesArgs {
    /// Path to the YAML file; falls back to PACKAGES_YAML
    #[arg(short, long, help = "Path to the packages YAML file")]
    pub file: Option<String>,
}
