//! Send worker: delivers one outgoing job directory by mail.

use std::process::ExitCode as ProcessExit;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use bin::client::smtp::SmtpClient;
use aftcore::paths::{DELETE_LOG_FIFO, OUTPUT_LOG_FIFO, TRANSFER_LOG_FIFO};
use aftcore::{HasExitCode, JobDescriptor, SpecialFlags, WorkArea, WorkerContext, signals};
use engine::dup::{DupAction, DupIdentity};
use engine::mail::MailProfile;
use engine::{DupConfig, NoBurst, SendWorker, WorkerLogs};
use logging::{FifoSink, TransLog};

#[derive(Debug, Parser)]
#[command(name = "aft-send", about = "Send worker of the aft transfer engine")]
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

    /// Worker slot within the host record.
    #[arg(long, default_value_t = 0)]
    job_no: u8,

    /// Mail gateway host name.
    #[arg(long)]
    hostname: String,

    /// Mail gateway port.
    #[arg(long, default_value_t = 25)]
    port: u16,

    /// Unique name of the outgoing job directory.
    #[arg(long)]
    msg_name: String,

    /// Envelope sender address.
    #[arg(long)]
    from: String,

    /// Recipient address; repeatable.
    #[arg(long = "recipient", required = true)]
    recipients: Vec<String>,

    /// Subject template; one `%s` receives the file names.
    #[arg(long)]
    subject: Option<String>,

    /// Send files as base64 attachments.
    #[arg(long)]
    attach: bool,

    /// Combine every file into one message.
    #[arg(long)]
    attach_all: bool,

    /// Maximum file age in seconds before local discard.
    #[arg(long, default_value_t = 0)]
    age_limit: i64,

    /// Seconds an archived file stays retrievable; 0 unlinks instead.
    #[arg(long, default_value_t = 0)]
    archive_time: i64,

    /// Duplicate-check window in seconds; 0 disables the check.
    #[arg(long, default_value_t = 0)]
    dup_check_timeout: i64,

    /// Job identifier used in log records and the duplicate store.
    #[arg(long, default_value_t = 0)]
    job_id: u32,

    /// Transfer timeout per I/O operation, in seconds.
    #[arg(long, default_value_t = 120)]
    transfer_timeout: u64,

    /// Name announced in the gateway greeting.
    #[arg(long, default_value = "aft")]
    helo_name: String,
}

fn job_from(args: &Args) -> Result<JobDescriptor, aftcore::JobError> {
    let mut db = JobDescriptor::default();
    db.host_alias = args.host_alias.clone();
    db.hostname = args.hostname.clone();
    db.port = args.port;
    db.user = String::new();
    db.transfer_timeout = args.transfer_timeout;
    db.age_limit = args.age_limit;
    db.archive_time = args.archive_time;
    db.dup_check_timeout = args.dup_check_timeout;
    db.job_id = args.job_id;
    db.fsa_pos = args.fsa_pos;
    db.job_no = args.job_no;
    if args.attach {
        db.special |= SpecialFlags::ATTACH_FILE;
    }
    if args.attach_all {
        db.special |= SpecialFlags::ATTACH_ALL_FILES;
    }
    db.with_msg_name(&args.msg_name)
}

fn run(args: &Args) -> Result<(), engine::WorkerError> {
    let work = WorkArea::new(&args.work_dir);
    let db = job_from(args).map_err(|e| engine::WorkerError::Config(e.to_string()))?;

    let mut client = SmtpClient::new(&db, &args.helo_name)
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

    let profile = MailProfile {
        from: args.from.clone(),
        reply_to: None,
        subject: args.subject.clone(),
        charset: String::new(),
        group_name: None,
        show_all_members: false,
        header_template: None,
    };
    let dup = (args.dup_check_timeout > 0).then_some(DupConfig {
        identity: DupIdentity::NAME | DupIdentity::SIZE,
        action: DupAction::Delete,
    });

    let mut gate = NoBurst;
    let worker = SendWorker::new(
        &mut ctx,
        &mut client,
        &mut gate,
        &mut logs,
        profile,
        args.recipients.clone(),
        dup,
    )?;
    let outcome = worker.run()?;
    tracing::info!(
        files = outcome.files,
        bytes = outcome.bytes,
        "send session complete"
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
            tracing::error!(error = %e, "send session failed");
            ProcessExit::from(e.exit_code())
        }
    }
}
