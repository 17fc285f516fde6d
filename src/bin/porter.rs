use anyhow::Result;
use clap::Parser;
use porter::{
    configuration,
    driver::{actuator_from_config, ActuatorDriver},
    logging,
    mission::MissionSequencer,
    motion::OpenLoopRelativeMotion,
    range_sensor::{LaserRangeSensor, RangeSensor},
    simulation::RecordingActuator,
    vision::{K210Vision, Vision},
};
use rand::{rngs::StdRng, SeedableRng};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::*;

#[derive(Parser, Debug)]
#[command(
    version,
    author = "David M. Weis <dweis7@gmail.com>",
    about = "Porter pick-and-place mission"
)]
struct Args {
    /// path to config
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sets the level of verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbosity: u8,

    /// log as json
    #[arg(long)]
    json_logs: bool,

    /// seed for the shelf draw and box 2 placement
    #[arg(long)]
    seed: Option<u64>,

    /// run against simulated hardware
    #[arg(long)]
    simulate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::setup_tracing(args.verbosity, args.json_logs);

    let app_config = configuration::AppConfig::load_config(&args.config)?;

    let (mut actuator, mut range_sensor, mut vision): (
        Box<dyn ActuatorDriver>,
        Box<dyn RangeSensor>,
        Box<dyn Vision>,
    ) = if args.simulate {
        info!("Using simulated hardware");
        (
            Box::new(RecordingActuator::default()),
            Box::new(
                app_config
                    .simulation
                    .range_sensor(app_config.motion.target_distance),
            ),
            Box::new(app_config.simulation.vision()),
        )
    } else {
        (
            actuator_from_config(app_config.actuator.clone()).await?,
            Box::new(LaserRangeSensor::new(&app_config.range_sensor)?),
            Box::new(K210Vision::new(&app_config.vision)?),
        )
    };

    let mut rng = match args.seed {
        Some(seed) => {
            info!("Using seed {}", seed);
            StdRng::seed_from_u64(seed)
        }
        None => StdRng::from_entropy(),
    };

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for ctrl-c {:?}", err);
                return;
            }
            warn!("Caught interrupt, stopping mission");
            cancel.cancel();
        }
    });

    let mut sequencer = MissionSequencer::new(
        OpenLoopRelativeMotion::new(app_config.motion.clone()),
        app_config.cycle.clone(),
        &mut *actuator,
        &mut *range_sensor,
    );
    let report = sequencer
        .execute(
            &mut *vision,
            app_config.vision.max_items,
            app_config.field.pallets(),
            &mut rng,
            &cancel,
        )
        .await?;

    info!(
        "Mission finished, {} of {} boxes placed",
        report.completed(),
        report.boxes.len()
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
