use anyhow::Result;
use clap::{Parser, Subcommand};
use rollcall_store::SqliteStore;
use rollcalld::config::Config;

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance CLI")]
struct Cli {
    /// Emit JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a new employee
    Add {
        /// Display name
        name: String,
    },
    /// List enrolled employees
    List,
    /// Remove an employee and their attendance history
    Remove {
        /// Employee id to remove
        id: i64,
    },
    /// Show recent attendance events, newest first
    Log {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
        /// Only events for this employee id
        #[arg(short, long)]
        employee: Option<i64>,
    },
    /// Show store status
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;
    let store = SqliteStore::open(&config.db_path, &config.images_dir, config.record_timeout())?;

    match cli.command {
        Commands::Add { name } => {
            let identity = store.add_employee(&name)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&identity)?);
            } else {
                let dir = config.images_dir.join(identity.id.to_string());
                println!("Enrolled '{}' with id {}", identity.name, identity.id);
                println!("Place enrollment images under {}", dir.display());
            }
        }
        Commands::List => {
            let employees = store.list_employees()?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&employees)?);
            } else if employees.is_empty() {
                println!("No employees enrolled");
            } else {
                for employee in employees {
                    println!("{:>6}  {}", employee.id, employee.name);
                }
            }
        }
        Commands::Remove { id } => {
            if store.remove_employee(id)? {
                println!("Removed employee {id}");
            } else {
                println!("No employee with id {id}");
            }
        }
        Commands::Log { limit, employee } => {
            let events = store.recent_events(limit, employee)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&events)?);
            } else if events.is_empty() {
                println!("No attendance events");
            } else {
                for event in events {
                    println!(
                        "{}  {:>6}  {}",
                        event.timestamp.to_rfc3339(),
                        event.employee_id,
                        event.status
                    );
                }
            }
        }
        Commands::Status => {
            let counts = store.counts()?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "db_path": config.db_path,
                        "employees": counts.employees,
                        "events": counts.events,
                        "last_event": counts.last_event.map(|t| t.to_rfc3339()),
                    })
                );
            } else {
                println!("database:  {}", config.db_path.display());
                println!("employees: {}", counts.employees);
                println!("events:    {}", counts.events);
                match counts.last_event {
                    Some(t) => println!("last:      {}", t.to_rfc3339()),
                    None => println!("last:      never"),
                }
            }
        }
    }

    Ok(())
}
