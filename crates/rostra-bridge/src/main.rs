//! rostra command-line interface.
//!
//! # Usage
//!
//! ```bash
//! export ROSTRA_HOMESERVER_URL=https://matrix.example.org
//! export ROSTRA_ACCESS_TOKEN=...
//!
//! # Provision rooms for a new chat module
//! rostra --roster roster.json module add --course 5 --section 1 --name "Office hours"
//!
//! # Reconcile one room, or all of them
//! rostra --roster roster.json sync --course 5 --group 2
//! rostra --roster roster.json resync --keep-going
//! ```

use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};

use clap::{Parser, Subcommand};
use rostra_bridge::{BridgeError, FileRoster, HttpRoomApi, ProductionRooms, RedbStore, SystemEnv};
use rostra_core::{
    Configuration, CourseId, CourseRooms, Environment, GroupId, Module, ModuleId, ModuleKind,
    ModuleName, ModuleStore, NotFound, RoomApi, RoomDirectory, RoomTopic, SectionId, SyncError,
    SyncReport,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Course chat-room provisioning and membership reconciliation
#[derive(Parser, Debug)]
#[command(name = "rostra")]
#[command(about = "Keep course chat rooms in lockstep with the roster")]
#[command(version)]
struct Args {
    /// Base URL of the homeserver
    #[arg(long, env = "ROSTRA_HOMESERVER_URL")]
    homeserver_url: String,

    /// Access token of the synchronizing agent
    #[arg(long, env = "ROSTRA_ACCESS_TOKEN", hide_env_values = true)]
    access_token: String,

    /// Element web client used for room links
    #[arg(long, env = "ROSTRA_ELEMENT_URL")]
    element_url: Option<String>,

    /// Path to the mapping database
    #[arg(long, env = "ROSTRA_DATABASE", default_value = "rostra.redb")]
    database: PathBuf,

    /// Path to the roster snapshot (JSON)
    #[arg(long, env = "ROSTRA_ROSTER", default_value = "roster.json")]
    roster: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the identity behind the access token
    Whoami,

    /// Reconcile the room of one course or group
    Sync {
        /// Course id
        #[arg(long)]
        course: i64,
        /// Group id; 0 or absent means the whole-course room
        #[arg(long, default_value_t = 0)]
        group: i64,
    },

    /// Reconcile every room, or every room of one course
    Resync {
        /// Restrict to one course
        #[arg(long)]
        course: Option<i64>,
        /// Continue past rooms that fail and report them at the end
        #[arg(long)]
        keep_going: bool,
    },

    /// Manage chat modules
    #[command(subcommand)]
    Module(ModuleCommand),

    /// Print the link to a room
    Url {
        /// Course id
        #[arg(long)]
        course: i64,
        /// Group id; 0 or absent means the whole-course room
        #[arg(long, default_value_t = 0)]
        group: i64,
    },
}

#[derive(Subcommand, Debug)]
enum ModuleCommand {
    /// Add a chat module and provision its rooms
    Add {
        /// Course id
        #[arg(long)]
        course: i64,
        /// Section id
        #[arg(long)]
        section: i64,
        /// Module name
        #[arg(long)]
        name: String,
        /// Module topic
        #[arg(long, default_value = "")]
        topic: String,
    },

    /// Rename a chat module and its rooms
    Rename {
        /// Module id
        #[arg(long)]
        module: i64,
        /// New name
        #[arg(long)]
        name: String,
        /// New topic; unchanged when absent
        #[arg(long)]
        topic: Option<String>,
    },

    /// Delete a chat module; the course's last module takes its rooms along
    Delete {
        /// Module id
        #[arg(long)]
        module: i64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let config =
        Configuration::new(&args.homeserver_url, &args.access_token, args.element_url.as_deref())
            .map_err(BridgeError::from)?;
    tracing::debug!(?config, "configuration loaded");

    let api = HttpRoomApi::new(&config)?;
    let mut out = io::stdout().lock();

    match args.command {
        Command::Whoami => {
            writeln!(out, "{}", api.whoami()?)?;
        },
        Command::Url { course, group } => {
            let store = RedbStore::open(&args.database).map_err(BridgeError::from)?;
            let (course_id, group_id) = scope(course, group)?;
            let mapping = store
                .find_mapping(course_id, group_id)
                .map_err(SyncError::from)?
                .ok_or(NotFound::Mapping { course_id, group_id })
                .map_err(SyncError::from)?;
            writeln!(out, "{}", config.room_url(&mapping.room_id))?;
        },
        command => {
            let rooms = assemble(api, &args.database, &args.roster)?;
            run(&rooms, &config, command, &mut out)?;
        },
    }

    Ok(())
}

fn assemble(
    api: HttpRoomApi,
    database: &Path,
    roster: &Path,
) -> Result<ProductionRooms, BridgeError> {
    let store = RedbStore::open(database)?;
    let roster = FileRoster::load(roster)?;
    Ok(CourseRooms::new(api, store.clone(), store, roster, SystemEnv::new()))
}

fn run(
    rooms: &ProductionRooms,
    config: &Configuration,
    command: Command,
    out: &mut impl Write,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Sync { course, group } => {
            let (course_id, group_id) = scope(course, group)?;
            let report = rooms.sync_room(course_id, group_id)?;
            print_report(out, &report)?;
        },
        Command::Resync { course, keep_going: false } => {
            let course_id = course.map(CourseId::new).transpose().map_err(SyncError::from)?;
            for report in rooms.resync_all(course_id)? {
                print_report(out, &report)?;
            }
        },
        Command::Resync { course, keep_going: true } => {
            let course_id = course.map(CourseId::new).transpose().map_err(SyncError::from)?;
            resync_keep_going(rooms, course_id, out)?;
        },
        Command::Module(ModuleCommand::Add { course, section, name, topic }) => {
            let module = Module::new(
                ModuleKind::CHAT,
                ModuleName::new(&name).map_err(SyncError::from)?,
                RoomTopic::new(&topic),
                CourseId::new(course).map_err(SyncError::from)?,
                SectionId::new(section).map_err(SyncError::from)?,
                SystemEnv::new().now(),
            );
            let module = rooms.add_module(&module)?;
            writeln!(out, "module {}", module.id)?;
            for mapping in rooms.directory().find_all_mappings(Some(module.course_id))? {
                writeln!(out, "{}", config.room_url(&mapping.room_id))?;
            }
        },
        Command::Module(ModuleCommand::Rename { module, name, topic }) => {
            let module_id = ModuleId::new(module).map_err(SyncError::from)?;
            let mut stored = rooms
                .modules()
                .find(module_id)?
                .ok_or(NotFound::Module(module_id))
                .map_err(SyncError::from)?;
            stored.name = ModuleName::new(&name).map_err(SyncError::from)?;
            if let Some(topic) = topic {
                stored.topic = RoomTopic::new(&topic);
            }
            rooms.update_module(&stored)?;
            writeln!(out, "module {module_id} renamed")?;
        },
        Command::Module(ModuleCommand::Delete { module }) => {
            let module_id = ModuleId::new(module).map_err(SyncError::from)?;
            if rooms.delete_module(module_id)? {
                writeln!(out, "module {module_id} deleted")?;
            } else {
                return Err(SyncError::from(NotFound::Module(module_id)).into());
            }
        },
        Command::Whoami | Command::Url { .. } => {},
    }

    Ok(())
}

/// Reconcile each room on its own, logging failures instead of stopping.
fn resync_keep_going(
    rooms: &ProductionRooms,
    course_id: Option<CourseId>,
    out: &mut impl Write,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut failed = 0usize;

    for mapping in rooms.directory().find_all_mappings(course_id)? {
        match rooms.sync_room(mapping.course_id, mapping.group_id) {
            Ok(report) => {
                print_report(out, &report)?;
            },
            Err(SyncError::NotFound(NotFound::Mapping { .. })) => {
                tracing::warn!(
                    room_id = %mapping.room_id,
                    "mapping vanished during resync, skipping"
                );
            },
            Err(err) => {
                tracing::warn!(
                    room_id = %mapping.room_id,
                    transient = err.is_transient(),
                    "room failed: {err}"
                );
                failed += 1;
            },
        }
    }

    if failed > 0 {
        return Err(format!("{failed} room(s) failed to synchronize").into());
    }
    Ok(())
}

fn scope(course: i64, group: i64) -> Result<(CourseId, Option<GroupId>), SyncError> {
    Ok((CourseId::new(course)?, GroupId::from_host(group)?))
}

fn print_report(out: &mut impl Write, report: &SyncReport) -> io::Result<()> {
    writeln!(out, "{}: invited {}, kicked {}", report.room_id, report.invited, report.kicked)
}
