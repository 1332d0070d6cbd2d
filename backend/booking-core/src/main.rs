// src/main.rs
use anyhow::{anyhow, Context, Result};
use chrono::{Duration, Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use booking_core::calendar::is_weekday;
use booking_core::error::BookingResult;
use booking_core::roster::PersonRecord;
use booking_core::weekly::monday_of;
use booking_core::{
    AppConfig, BookingPlan, BookingRun, BookingSettings, CalendarFacts, EmitMode, FiscalYear, Ledger,
    LedgerCache, LoggedHours, OffDaysCache, Roster, WeeklyEmitter,
};

// --- CLI ---

#[derive(Parser)]
#[command(name = "booking")]
#[command(about = "Splits working days across funding codes and writes timecard lines")]
#[command(version)]
struct Cli {
    /// Site holiday dates, one YYYY-MM-DD per line
    #[arg(long, global = true)]
    holidays: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Emit a week of bookings for one person or everyone in the roster
    Week {
        #[arg(long)]
        person: Option<String>,

        /// Any date in the week; defaults to this week
        #[arg(long)]
        week_of: Option<NaiveDate>,

        /// Readable lines instead of bulk upload CSV
        #[arg(long)]
        manual: bool,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show one day's allocation with the per-entry breakdown
    Day {
        #[arg(long)]
        person: String,

        #[arg(long)]
        date: NaiveDate,
    },

    /// Print each person's total FTE share
    Audit,

    /// Record leave in a person's off-day cache
    Leave {
        #[arg(long)]
        person: String,

        #[arg(long)]
        from: NaiveDate,

        /// Last day of the absence; defaults to `from`
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Total hours off; whole weekdays if not given
        #[arg(long)]
        hours: Option<f64>,
    },
}

// --- Session ---

/// Everything loaded once per invocation.
struct Session {
    config: AppConfig,
    settings: BookingSettings,
    roster: Roster,
    holidays: CalendarFacts,
    off_days: OffDaysCache,
    ledger_cache: LedgerCache,
}

impl Session {
    fn load(holidays_path: Option<&Path>) -> Result<Self> {
        let config = AppConfig::from_env().context("Failed to read BOOKING_* configuration")?;
        info!("App configuration loaded.");
        let settings = config.booking_settings();
        let roster = Roster::load(&config.roster_path)
            .with_context(|| format!("Failed to load roster {}", config.roster_path.display()))?;
        let holidays = match holidays_path {
            Some(path) => read_holidays(path, settings.hours_per_day)?,
            None => CalendarFacts::new(),
        };
        let off_days = OffDaysCache::new(
            config.off_days_dir.clone(),
            Duration::days(config.off_days_max_age_days),
        );
        let ledger_cache = LedgerCache::new(Duration::hours(config.ledger_max_age_hours));
        Ok(Self {
            config,
            settings,
            roster,
            holidays,
            off_days,
            ledger_cache,
        })
    }

    fn people(&self, name: Option<&str>) -> Result<Vec<PersonRecord>> {
        match name {
            Some(name) => self
                .roster
                .person(name)
                .cloned()
                .map(|p| vec![p])
                .ok_or_else(|| anyhow!("{} is not in the roster", name)),
            None => Ok(self.roster.people.clone()),
        }
    }

    fn calendar_for(&self, person: &str) -> BookingResult<CalendarFacts> {
        let mut calendar = self.holidays.clone();
        match self.off_days.load_latest(person, Local::now())? {
            Some(off_days) => calendar.merge(&off_days),
            None => warn!("No off days recorded for {}, using site holidays only", person),
        }
        Ok(calendar)
    }

    fn ledger(&mut self) -> BookingResult<&Ledger> {
        let path = self.config.ledger_path.clone();
        self.ledger_cache
            .get_or_load(Local::now().naive_local(), || load_ledger(&path))
    }

    fn logged_hours(&mut self, person: &str, plan: &BookingPlan) -> BookingResult<LoggedHours> {
        Ok(self.ledger()?.logged_hours(person, plan))
    }

    fn week_lines(
        &mut self,
        record: &PersonRecord,
        monday: NaiveDate,
        mode: EmitMode,
        today: NaiveDate,
    ) -> BookingResult<Vec<String>> {
        let plan = self.roster.plan_for(record, FiscalYear::containing(monday))?;
        let calendar = self.calendar_for(&record.name)?;
        let logged = self.logged_hours(&record.name, &plan)?;
        let already_booked = self.ledger()?.hours_for_week(&record.name, monday);
        if already_booked > 0.0 {
            warn!(
                "{} already has {:.2} hours in the ledger for the week of {}",
                record.name, already_booked, monday
            );
        }

        let mut run = BookingRun::new(&plan, &calendar, &logged, &self.settings);
        let mut emitter = WeeklyEmitter::new(record.info(), mode);
        let mut lines = Vec::new();
        if mode == EmitMode::Manual {
            lines.push(record.name.clone());
        }
        lines.extend(emitter.emit_week(&mut run, monday, today)?);
        Ok(lines)
    }
}

fn load_ledger(path: &Path) -> BookingResult<Ledger> {
    if !path.exists() {
        warn!("No ledger snapshot at {}, treating logged hours as zero", path.display());
        return Ok(Ledger::default());
    }
    Ledger::from_csv_path(path)
}

fn read_holidays(path: &Path, hours_per_day: f64) -> Result<CalendarFacts> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read holidays file {}", path.display()))?;
    let mut dates = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let date = NaiveDate::parse_from_str(line, "%Y-%m-%d")
            .with_context(|| format!("{} line {}: bad date '{}'", path.display(), i + 1, line))?;
        dates.push(date);
    }
    info!("Loaded {} site holidays from {}", dates.len(), path.display());
    Ok(CalendarFacts::with_site_holidays(dates, hours_per_day))
}

fn write_lines(lines: &[String], output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let mut text = lines.join("\n");
            text.push('\n');
            fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {} lines to {}", lines.len(), path.display());
        }
        None => {
            for line in lines {
                println!("{}", line);
            }
        }
    }
    Ok(())
}

// --- Commands ---

fn run_week(
    session: &mut Session,
    person: Option<&str>,
    week_of: NaiveDate,
    mode: EmitMode,
    output: Option<&Path>,
) -> Result<()> {
    let today = Local::now().date_naive();
    let monday = monday_of(week_of);
    info!("Emitting bookings for the week of {}", monday);

    let mut lines = Vec::new();
    for record in session.people(person)? {
        match session.week_lines(&record, monday, mode, today) {
            Ok(person_lines) => lines.extend(person_lines),
            Err(e) if e.is_configuration() => {
                error!("Skipping {}: {}", record.name, e);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to emit week for {}", record.name));
            }
        }
    }
    write_lines(&lines, output)
}

fn run_day(session: &mut Session, person: &str, date: NaiveDate) -> Result<()> {
    let record = session
        .roster
        .person(person)
        .cloned()
        .ok_or_else(|| anyhow!("{} is not in the roster", person))?;
    let plan = session
        .roster
        .plan_for(&record, FiscalYear::containing(date))
        .with_context(|| format!("Invalid booking plan for {}", person))?;
    let calendar = session.calendar_for(person)?;
    let logged = session.logged_hours(person, &plan)?;
    if !is_weekday(date) {
        warn!("{} is a weekend day", date);
    }

    let mut run = BookingRun::new(&plan, &calendar, &logged, &session.settings);
    let allocation = run.allocate(date)?;
    println!("{} {}", person, date.format("%a %d/%m/%Y"));
    for booking in &allocation.entries {
        let entry = &plan.entries()[booking.entry_index];
        println!(
            "  {}\t{:?}\tshare {:.3}\t{:.2}",
            booking.code,
            booking.priority,
            entry.share(),
            booking.hours
        );
    }
    for (code, hours) in &allocation.bookings {
        println!("{}\t{:.2}", code, hours);
    }
    println!("Total\t{:.2}", allocation.total());
    Ok(())
}

fn run_audit(session: &Session, fiscal_year: FiscalYear) -> Result<()> {
    for record in &session.roster.people {
        match session.roster.plan_for(record, fiscal_year) {
            Ok(plan) => println!("{}: {:.2}", record.info().known_as, plan.total_share()),
            Err(e) => {
                error!("Invalid booking plan for {}: {}", record.name, e);
                println!("{}: {}", record.info().known_as, e);
            }
        }
    }
    Ok(())
}

fn run_leave(
    session: &Session,
    person: &str,
    from: NaiveDate,
    to: Option<NaiveDate>,
    hours: Option<f64>,
) -> Result<()> {
    let to = to.unwrap_or(from);
    if to < from {
        return Err(anyhow!("Leave ends on {} before it starts on {}", to, from));
    }
    let hours_per_day = session.settings.hours_per_day;
    let mut off_days = session.off_days.load(person)?.unwrap_or_default();
    match hours {
        Some(hours) => off_days.add_absence(from, to, hours, hours_per_day),
        None => {
            for day in from.iter_days().take_while(|day| *day <= to).filter(|day| is_weekday(*day)) {
                off_days.add_whole_day(day, hours_per_day);
            }
        }
    }
    session.off_days.store(person, &off_days)?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Setting tracing subscriber failed")?;

    let mut session = Session::load(cli.holidays.as_deref())?;
    let today = Local::now().date_naive();

    match cli.command {
        Commands::Week {
            person,
            week_of,
            manual,
            output,
        } => {
            let mode = if manual { EmitMode::Manual } else { EmitMode::BulkUpload };
            run_week(
                &mut session,
                person.as_deref(),
                week_of.unwrap_or(today),
                mode,
                output.as_deref(),
            )?;
        }
        Commands::Day { person, date } => run_day(&mut session, &person, date)?,
        Commands::Audit => run_audit(&session, FiscalYear::containing(today))?,
        Commands::Leave {
            person,
            from,
            to,
            hours,
        } => run_leave(&session, &person, from, to, hours)?,
    }
    Ok(())
}
