use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use log::{debug, info};
use serde_json::Value as Json;

use hcs_core::provider::{Provider, ResourceType};
use hcs_core::resource::{Resource, ResourceId, State};
use hcs_core::schema::ResourceSchema;
use hcs_provider::resources::resource_types;
use hcs_provider::{Config, HcsProvider, validate_resource};

#[derive(Parser)]
#[command(name = "hcs")]
#[command(about = "Drive HuaweiCloudStack resources one call at a time", long_about = None)]
struct Cli {
    /// Provider settings as JSON; OS_* environment variables are used when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List supported resource types
    Types,
    /// Show the attributes of a resource type
    Schema {
        /// Resource type (e.g. networking_subnet_v2)
        resource_type: String,
    },
    /// Validate resource files without contacting the cloud
    Validate {
        /// Resource JSON file (a single resource or a list)
        file: PathBuf,
    },
    /// Create a resource and print its state
    Create {
        /// Resource JSON file
        file: PathBuf,
    },
    /// Refresh a state file and print the current state
    Read {
        /// State JSON file
        state: PathBuf,
    },
    /// Adopt an existing cloud object and print its state
    Import {
        resource_type: String,
        name: String,
        /// Backend identifier (id, or name for keypairs)
        identifier: String,
    },
    /// Update a resource in place and print its new state
    Update {
        /// State JSON file
        state: PathBuf,
        /// Resource JSON file with the desired attributes
        file: PathBuf,
    },
    /// Delete the resource recorded in a state file
    Delete {
        /// State JSON file
        state: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::new().filter_or("HCS_LOG", "warn")).init();

    let cli = Cli::parse();
    let config = cli.config;

    let result = match cli.command {
        Commands::Types => run_types(),
        Commands::Schema { resource_type } => run_schema(&resource_type),
        Commands::Validate { file } => run_validate(config.as_deref(), &file),
        Commands::Create { file } => run_create(config.as_deref(), &file).await,
        Commands::Read { state } => run_read(config.as_deref(), &state).await,
        Commands::Import {
            resource_type,
            name,
            identifier,
        } => {
            let id = ResourceId::new(resource_type, name);
            run_import(config.as_deref(), &id, &identifier).await
        }
        Commands::Update { state, file } => run_update(config.as_deref(), &state, &file).await,
        Commands::Delete { state } => run_delete(config.as_deref(), &state).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<Config, String> {
    let config = match path {
        Some(path) => Config::from_file(path)
            .map_err(|e| format!("Failed to load {}: {}", path.display(), e))?,
        None => {
            debug!("No config file given, reading OS_* environment variables");
            Config::from_env()
        }
    };
    info!("Using region {}", config.region);
    Ok(config)
}

fn build_provider(config: Option<&Path>) -> Result<HcsProvider, String> {
    HcsProvider::new(load_config(config)?).map_err(|e| e.to_string())
}

fn read_json(path: &Path) -> Result<Json, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    serde_json::from_str(&content).map_err(|e| format!("Failed to parse {}: {}", path.display(), e))
}

/// A resource file holds one resource or a list of them
fn load_resources(path: &Path) -> Result<Vec<Resource>, String> {
    let json = read_json(path)?;
    let resources = match json {
        Json::Array(_) => serde_json::from_value(json),
        other => serde_json::from_value::<Resource>(other).map(|r| vec![r]),
    };
    let resources =
        resources.map_err(|e| format!("Invalid resource in {}: {}", path.display(), e))?;
    debug!("Loaded {} resources from {}", resources.len(), path.display());
    Ok(resources)
}

fn load_resource(path: &Path) -> Result<Resource, String> {
    let mut resources = load_resources(path)?;
    match resources.len() {
        1 => Ok(resources.remove(0)),
        n => Err(format!(
            "{} must contain exactly one resource, found {}",
            path.display(),
            n
        )),
    }
}

fn load_state(path: &Path) -> Result<State, String> {
    serde_json::from_value(read_json(path)?)
        .map_err(|e| format!("Invalid state in {}: {}", path.display(), e))
}

fn print_state(state: &State) -> Result<(), String> {
    let json = serde_json::to_string_pretty(state).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}

fn find_schema(resource_type: &str) -> Result<ResourceSchema, String> {
    resource_types()
        .into_iter()
        .find(|t| t.name() == resource_type)
        .map(|t| t.schema())
        .ok_or_else(|| format!("Unknown resource type: {}", resource_type))
}

fn run_types() -> Result<(), String> {
    let mut names: Vec<&str> = resource_types().iter().map(|t| t.name()).collect();
    names.sort();
    for name in names {
        println!("{}", name);
    }
    Ok(())
}

fn format_flags(attr: &hcs_core::schema::AttributeSchema) -> String {
    let mut flags = Vec::new();
    if attr.required {
        flags.push("required");
    }
    if attr.computed {
        flags.push("computed");
    }
    if attr.force_new {
        flags.push("force_new");
    }
    if attr.sensitive {
        flags.push("sensitive");
    }
    flags.join(", ")
}

fn run_schema(resource_type: &str) -> Result<(), String> {
    let schema = find_schema(resource_type)?;
    println!("{}", schema.resource_type.bold());
    if let Some(description) = &schema.description {
        println!("  {}", description);
    }
    println!();

    let mut attributes: Vec<_> = schema.attributes.values().collect();
    attributes.sort_by(|a, b| a.name.cmp(&b.name));
    for attr in attributes {
        let flags = format_flags(attr);
        if flags.is_empty() {
            println!("  {}: {}", attr.name.cyan(), attr.attr_type);
        } else {
            println!("  {}: {} ({})", attr.name.cyan(), attr.attr_type, flags.dimmed());
        }
        if let Some(description) = &attr.description {
            println!("      {}", description);
        }
    }
    Ok(())
}

fn run_validate(config: Option<&Path>, file: &Path) -> Result<(), String> {
    let config = load_config(config)?;
    let resources = load_resources(file)?;
    eprintln!("{}", "Validating...".cyan());

    let errors: Vec<String> = resources
        .iter()
        .filter_map(|r| validate_resource(&config, r).err())
        .map(|e| e.to_string())
        .collect();
    if !errors.is_empty() {
        return Err(errors.join("\n"));
    }

    eprintln!(
        "{}",
        format!("✓ {} resources validated successfully.", resources.len()).green()
    );
    for resource in &resources {
        eprintln!("  • {}", resource.id);
    }
    Ok(())
}

async fn run_create(config: Option<&Path>, file: &Path) -> Result<(), String> {
    let resource = load_resource(file)?;
    let provider = build_provider(config)?;
    info!("Creating {}", resource.id);
    let state = provider.create(&resource).await.map_err(|e| e.to_string())?;
    eprintln!("  {} create {}", "✓".green(), resource.id);
    print_state(&state)
}

async fn run_read(config: Option<&Path>, state: &Path) -> Result<(), String> {
    let current = load_state(state)?;
    let provider = build_provider(config)?;
    info!("Refreshing {}", current.id);
    let state = provider.read(&current).await.map_err(|e| e.to_string())?;
    if !state.exists {
        eprintln!("{}", format!("{} no longer exists.", state.id).yellow());
    }
    print_state(&state)
}

async fn run_import(config: Option<&Path>, id: &ResourceId, identifier: &str) -> Result<(), String> {
    find_schema(&id.resource_type)?;
    let provider = build_provider(config)?;
    info!("Importing {} from {}", id, identifier);
    let state = provider
        .import(id, identifier)
        .await
        .map_err(|e| e.to_string())?;
    eprintln!("  {} import {} ({})", "✓".green(), id, identifier);
    print_state(&state)
}

async fn run_update(config: Option<&Path>, state: &Path, file: &Path) -> Result<(), String> {
    let from = load_state(state)?;
    let to = load_resource(file)?;
    if from.id != to.id {
        return Err(format!("State is for {}, resource is {}", from.id, to.id));
    }
    let provider = build_provider(config)?;
    info!("Updating {}", to.id);
    let state = provider.update(&from, &to).await.map_err(|e| e.to_string())?;
    eprintln!("  {} update {}", "✓".green(), to.id);
    print_state(&state)
}

async fn run_delete(config: Option<&Path>, state: &Path) -> Result<(), String> {
    let current = load_state(state)?;
    let provider = build_provider(config)?;
    info!("Deleting {}", current.id);
    provider.delete(&current).await.map_err(|e| e.to_string())?;
    eprintln!("  {} delete {}", "✓".green(), current.id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_single_resource_or_list() {
        let single = write_temp(
            r#"{"id": {"resource_type": "networking_network_v2", "name": "network_1"},
                "attributes": {"name": "network_1"}}"#,
        );
        let resources = load_resources(single.path()).unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].id.name, "network_1");

        let list = write_temp(
            r#"[{"id": {"resource_type": "networking_network_v2", "name": "a"}},
                {"id": {"resource_type": "compute_keypair_v2", "name": "b"}}]"#,
        );
        assert_eq!(load_resources(list.path()).unwrap().len(), 2);
        assert!(load_resource(list.path()).is_err());
    }

    #[test]
    fn validate_reports_every_invalid_resource() {
        let file = write_temp(
            r#"[{"id": {"resource_type": "networking_subnet_v2", "name": "subnet_1"},
                 "attributes": {"network_id": "n-1", "cidr": "192.168.199.0/24",
                                "gateway_ip": "192.168.199.1", "no_gateway": true}},
                {"id": {"resource_type": "compute_instance_v2", "name": "vm"}}]"#,
        );
        let config = write_temp(r#"{"region": "region-1"}"#);
        let err = run_validate(Some(config.path()), file.path()).unwrap_err();
        assert!(err.contains("networking_subnet_v2.subnet_1"));
        assert!(err.contains("Unknown resource type: compute_instance_v2"));
    }

    #[test]
    fn schema_of_unknown_type_is_an_error() {
        assert!(find_schema("compute_instance_v2").is_err());
        let schema = find_schema("networking_router_v2").unwrap();
        assert!(schema.attributes.contains_key("external_gateway"));
    }

    #[test]
    fn config_file_sets_region() {
        let file = write_temp(r#"{"region": "region-2"}"#);
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.region, "region-2");
    }

    #[test]
    fn config_file_errors_name_the_file() {
        let err = load_config(Some(Path::new("/nonexistent/hcs.json"))).unwrap_err();
        assert!(err.contains("/nonexistent/hcs.json"));
    }
}
