use clap::{Args, Parser, Subcommand};
use happy_places::config::{AppPaths, Settings};
use happy_places::db;
use happy_places::draft::PickState;
use happy_places::error::{Error, Result};
use happy_places::geocode::GazetteerGeocoder;
use happy_places::images;
use happy_places::location::FixedLocationProvider;
use happy_places::models::{DraftField, Place};
use happy_places::places::PlaceCatalog;
use happy_places::session::{DraftSession, PlaceServices};
use happy_places::store::{RecordStore, SqlitePlaceStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "happy-places", version, about = "Record and browse your happy places")]
struct Cli {
    /// Data directory; defaults to the platform data directory.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List places, newest first.
    List,
    /// Print one place as JSON.
    Show { id: i64 },
    /// Add a place.
    Add(EditArgs),
    /// Edit a stored place.
    Edit {
        id: i64,
        #[command(flatten)]
        args: EditArgs,
    },
    /// Delete a place.
    Delete { id: i64 },
    /// List places that have a location, as shown on the map.
    Markers,
}

#[derive(Args, Debug)]
struct EditArgs {
    #[arg(long)]
    title: Option<String>,

    /// Image to copy into the library.
    #[arg(long)]
    image: Option<PathBuf>,

    #[arg(long)]
    note: Option<String>,

    /// Pick this latitude on the map (needs --lon).
    #[arg(long, requires = "lon", allow_negative_numbers = true)]
    lat: Option<f64>,

    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    lon: Option<f64>,

    /// Use the device location.
    #[arg(long, conflicts_with_all = ["lat", "lon"])]
    here: bool,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        log::error!("{err}");
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let paths = match &cli.data_dir {
        Some(dir) => AppPaths::at(dir)?,
        None => AppPaths::discover()?,
    };
    let settings = Settings::load(&paths)?;
    let pool = db::init_database(&paths)?;
    let store: Arc<dyn RecordStore> = Arc::new(SqlitePlaceStore::new(pool));
    let catalog = PlaceCatalog::new(store.clone());

    match cli.command {
        Command::List => {
            for place in catalog.all().await? {
                print_summary(&place);
            }
        }
        Command::Show { id } => {
            let place = catalog.get(id).await?.ok_or(Error::NotFound(id))?;
            println!("{}", serde_json::to_string_pretty(&place)?);
        }
        Command::Markers => {
            for marker in catalog.markers().await? {
                println!(
                    "{}\t{}\t{}\t{}",
                    marker.id,
                    marker.coordinates,
                    marker.title,
                    marker.label()
                );
            }
        }
        Command::Delete { id } => {
            let place = catalog.delete(id).await?;
            println!("deleted {id}: {}", place.title);
        }
        Command::Add(args) => {
            let session = DraftSession::start_add(services(store, &settings)?);
            let id = edit_and_commit(&session, args, &paths).await?;
            println!("added place {id}");
        }
        Command::Edit { id, args } => {
            if catalog.get(id).await?.is_none() {
                return Err(Error::NotFound(id));
            }
            let session = DraftSession::start_edit(services(store, &settings)?, id);
            session.wait_loaded().await?;
            let id = edit_and_commit(&session, args, &paths).await?;
            println!("updated place {id}");
        }
    }
    Ok(())
}

fn services(store: Arc<dyn RecordStore>, settings: &Settings) -> Result<PlaceServices> {
    let geocoder = GazetteerGeocoder::from_config(&settings.geocode)?;
    let location = FixedLocationProvider::from_config(&settings.location);
    Ok(PlaceServices::new(store, Arc::new(geocoder), Arc::new(location)).with_settings(settings))
}

async fn edit_and_commit(session: &DraftSession, args: EditArgs, paths: &AppPaths) -> Result<i64> {
    if let Some(title) = args.title {
        session.update_field(DraftField::Title(title))?;
    }
    if let Some(note) = args.note {
        session.update_field(DraftField::Note(note))?;
    }
    if let Some(image) = args.image {
        let stored = images::import_image(image, paths.images_dir.clone()).await?;
        session.update_field(DraftField::ImagePath(Some(
            stored.to_string_lossy().to_string(),
        )))?;
    }

    if let (Some(lat), Some(lon)) = (args.lat, args.lon) {
        let mut selection = session.open_map_selection()?;
        selection.tap(lat, lon)?;
        selection.confirm()?;
        session
            .wait_until(|s| s.pick == PickState::ExplicitPick || !s.phase.is_active())
            .await?;
    } else if args.here {
        match session.request_current_location().await? {
            Some(here) => println!("current location: {here}"),
            None => log::warn!("Location fix arrived after a newer location; ignored"),
        }
    }

    match tokio::time::timeout(SETTLE_TIMEOUT, session.wait_settled()).await {
        Ok(snapshot) => {
            if let Some(address) = snapshot?.address {
                println!("address: {address}");
            }
        }
        Err(_) => log::warn!("Address lookup still pending; saving without an address"),
    }

    session.commit().await
}

fn print_summary(place: &Place) {
    let location = place
        .address
        .clone()
        .or_else(|| place.location.map(|c| c.to_string()))
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{}\t{}\t{}\t{}",
        place.id.unwrap_or_default(),
        place.date,
        place.title,
        location
    );
}
