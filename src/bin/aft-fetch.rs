//! Retrieve worker: fetches files from one watched remote directory.
//!
//! Spawned by the scheduler with the job on the command line; coordinates
//! through the shared tables under the work directory and exits with one
//! of the scheduler-visible codes.

use std::process::ExitCode as ProcessExit;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use bin::client::ftp::FtpClient;
use bin::masks::compile_group;
use aftcore::paths::{DELETE_LOG_FIFO, OUTPUT_LOG_FIFO, TRANSFER_LOG_FIFO};
use aftcore::{HasExitCode, JobDescriptor, WorkArea, WorkerContext, signals};
use engine::{FetchWorker, NoBurst, WorkerLogs};
use logging::{FifoSink, TransLog};
use protocol::TransferKind;

#[derive(Debug, Parser)]
#[command(name = "aft-fetch", about = "Fetch worker of the aft transfer engine")]
struct Args {
    /// Work-area root directory.
    #[arg(long)]
    work_dir: String,

    /// Host alias in the shared host table.
    #[arg(long)]
    host_alias: String,

    /// Record index of the host in its table.
    #[arg(long)]
    fsa_pos: usize,

    /// Directory alias in the shared directory table.
    #[arg(long)]
    dir_alias: String,

    /// Record index of the directory in its table.
    #[arg(long)]
    fra_pos: usize,

    /// Worker slot within the host record.
    #[arg(long, default_value_t = 0)]
    job_no: u8,

    /// Remote host name.
    #[arg(long)]
    hostname: String,

    /// Remote port.
    #[arg(long, default_value_t = 21)]
    port: u16,

    /// Login user.
    #[arg(long, default_value = "anonymous")]
    user: String,

    /// Login password.
    #[arg(long, default_value = "")]
    password: String,

    /// Remote directory to change into.
    #[arg(long, default_value = "")]
    target_dir: String,

    /// ASCII instead of binary transfer representation.
    #[arg(long)]
    ascii: bool,

    /// Transfer timeout per I/O operation, in seconds.
    #[arg(long, default_value_t = 120)]
    transfer_timeout: u64,

    /// Seconds to wait for follow-up jobs on the open connection.
    #[arg(long, default_value_t = 0)]
    keep_connected: u32,

    /// Directory identifier used in log records.
    #[arg(long, default_value_t = 0)]
    dir_id: u32,

    /// File-mask patterns forming one group; `!` prefix excludes.
    #[arg(long = "mask", default_value = "*")]
    masks: Vec<String>,
}

fn job_from(args: &Args) -> JobDescriptor {
    let mut db = JobDescriptor::default();
    db.host_alias = args.host_alias.clone();
    db.hostname = args.hostname.clone();
    db.port = args.port;
    db.user = args.user.clone();
    db.password = args.password.clone();
    db.target_dir = args.target_dir.clone();
    db.transfer_kind = if args.ascii {
        TransferKind::Ascii
    } else {
        TransferKind::Binary
    };
    db.transfer_timeout = args.transfer_timeout;
    db.keep_connected = args.keep_connected;
    db.fsa_pos = args.fsa_pos;
    db.fra_pos = Some(args.fra_pos);
    db.dir_alias = args.dir_alias.clone();
    db.dir_id = args.dir_id;
    db.job_no = args.job_no;
    db
}

fn run(args: &Args) -> Result<(), engine::WorkerError> {
    let work = WorkArea::new(&args.work_dir);
    let db = job_from(args);

    let mut client = FtpClient::new(&db)
        .map_err(|e| engine::WorkerError::at(engine::Step::Connect, e))?;
    let mut ctx = WorkerContext::attach(work.clone(), db)?;

    let mut logs = WorkerLogs {
        trans: TransLog::new(
            FifoSink::open(&work.fifo(TRANSFER_LOG_FIFO))?,
            &args.host_alias,
            args.job_no,
        ),
        output: FifoSink::open(&work.fifo(OUTPUT_LOG_FIFO))?,
        delete: FifoSink::open(&work.fifo(DELETE_LOG_FIFO))?,
    };

    let masks = compile_group(&args.masks);
    let mut gate = NoBurst;
    let worker = FetchWorker::new(&mut ctx, &mut client, &mut gate, &mut logs, &masks)?;
    let outcome = worker.run()?;
    tracing::info!(
        files = outcome.files,
        bytes = outcome.bytes,
        "fetch session complete"
    );
    Ok(())
}

fn main() -> ProcessExit {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    if let Err(e) = signals::install() {
        eprintln!("cannot install signal handlers: {e}");
        return ProcessExit::from(aftcore::ExitCode::Incorrect);
    }

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ProcessExit::from(aftcore::ExitCode::TransferSuccess),
        Err(e) => {
            tracing::error!(error = %e, "fetch session failed");
            ProcessExit::from(e.exit_code())
        }
    }
}
