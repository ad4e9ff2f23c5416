use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use anyhow::{anyhow, Context};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hospital_db::{
    config::{Config, RetryPolicy, DEFAULT_MAX_ATTEMPTS},
    hospital::{
        model::{parse_date, Appointment, AppointmentStatus, Gender, TimeSlot},
        Hospital,
    },
    sql::engine::{Engine, KVEngine},
    storage::{disk::DiskEngine, memory::MemoryEngine},
};

#[derive(Parser, Debug)]
#[command(name = "hospital-db")]
#[command(about = "Hospital scheduling database with an interactive menu")]
struct Args {
    /// Data file; everything is kept in memory when omitted
    #[arg(long, env = "HOSPITAL_DB_DATA")]
    data: Option<PathBuf>,
    /// Attempts per operation before a transaction conflict is reported
    #[arg(long, env = "HOSPITAL_DB_MAX_ATTEMPTS", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    max_attempts: u32,
    /// Backoff between conflicting attempts, in milliseconds
    #[arg(long, env = "HOSPITAL_DB_RETRY_BACKOFF_MS", default_value_t = 10)]
    retry_backoff_ms: u64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hospital_db=warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args = Args::parse();
    let retry = RetryPolicy::new(args.max_attempts, Duration::from_millis(args.retry_backoff_ms))?;
    let config = Config::new(args.data, retry)?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    match config.data_path() {
        Some(path) => {
            let disk = DiskEngine::open(path)
                .with_context(|| format!("cannot open data file {}", path.display()))?;
            let engine = KVEngine::new(disk)?;
            let status = engine.status()?;
            tracing::info!(
                path = %path.display(),
                engine = %status.name,
                keys = status.keys,
                disk_size = status.disk_size,
                garbage = status.garbage_ratio(),
                "opened data file"
            );
            run(engine, &config, stdin.lock(), stdout.lock())
        }
        None => run(KVEngine::new(MemoryEngine::new())?, &config, stdin.lock(), stdout.lock()),
    }
}

fn run<E: Engine>(engine: E, config: &Config, input: impl BufRead, output: impl Write) -> anyhow::Result<()> {
    let hospital = Hospital::open(engine, config.retry())?;
    Menu { hospital, input, output }.run()
}

const MENU: &[&str] = &[
    "Add Department",
    "Add Doctor",
    "Add Patient",
    "Add Appointment",
    "Make an Appointment",
    "List appointments of a given doctor and date range",
    "List all available appointments of a given department",
    "List number of appointments per doctor and status",
    "Find number of patients per doctor with a given status",
    "Expire past appointments",
    "< EXIT",
];

/// Interactive operator menu
struct Menu<E: Engine, R, W> {
    hospital: Hospital<E>,
    input: R,
    output: W,
}

impl<E: Engine, R: BufRead, W: Write> Menu<E, R, W> {
    fn run(mut self) -> anyhow::Result<()> {
        loop {
            writeln!(self.output, "MAIN MENU")?;
            writeln!(self.output, "---------")?;
            for (number, item) in MENU.iter().enumerate() {
                writeln!(self.output, "{}. {}", number + 1, item)?;
            }

            let Some(choice) = self.read_choice()? else {
                break;
            };
            let result = match choice {
                1 => self.add_department(),
                2 => self.add_doctor(),
                3 => self.add_patient(),
                4 => self.add_appointment(),
                5 => self.make_appointment(),
                6 => self.appointments_of_doctor(),
                7 => self.available_appointments_of_department(),
                8 => self.appointment_counts_per_doctor(),
                9 => self.patient_counts_with_status(),
                10 => self.expire_past(),
                _ => break,
            };
            if let Err(err) = result {
                tracing::debug!(choice, error = %err, "menu action failed");
                writeln!(self.output, "error: {:#}", err)?;
            }
        }
        writeln!(self.output, "Bye!")?;
        Ok(())
    }

    /// Reads a menu number, asking again until one is valid. `None` once
    /// input is exhausted.
    fn read_choice(&mut self) -> anyhow::Result<Option<usize>> {
        loop {
            write!(self.output, "Please make your choice: ")?;
            self.output.flush()?;
            let Some(line) = self.read_line()? else {
                return Ok(None);
            };
            match line.trim().parse::<usize>() {
                Ok(choice) if (1..=MENU.len()).contains(&choice) => return Ok(Some(choice)),
                _ => writeln!(self.output, "Your input is invalid!")?,
            }
        }
    }

    fn read_line(&mut self) -> anyhow::Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    fn prompt(&mut self, label: &str) -> anyhow::Result<String> {
        write!(self.output, "\t{}: ", label)?;
        self.output.flush()?;
        let line = self.read_line()?.ok_or_else(|| anyhow!("input ended"))?;
        Ok(line.trim().to_string())
    }

    fn prompt_parse<T>(&mut self, label: &str) -> anyhow::Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        let line = self.prompt(label)?;
        line.parse::<T>().with_context(|| format!("invalid {} {:?}", label, line))
    }

    /// A blank answer lets the store pick the id
    fn prompt_id(&mut self, label: &str) -> anyhow::Result<Option<i64>> {
        let line = self.prompt(label)?;
        if line.is_empty() {
            return Ok(None);
        }
        Ok(Some(line.parse().with_context(|| format!("invalid {} {:?}", label, line))?))
    }

    fn prompt_date(&mut self, label: &str) -> anyhow::Result<chrono::NaiveDate> {
        let line = self.prompt(label)?;
        Ok(parse_date(&line)?)
    }

    fn print_table(&mut self, header: &[&str], rows: &[Vec<String>]) -> io::Result<()> {
        writeln!(self.output, "{}", header.join("\t"))?;
        for row in rows {
            writeln!(self.output, "{}", row.join("\t"))?;
        }
        writeln!(self.output, "total row(s): {}", rows.len())
    }

    fn add_department(&mut self) -> anyhow::Result<()> {
        let id = self.prompt_id("Enter new department's id (blank to generate)")?;
        let name = self.prompt("Enter new department's name")?;
        let department = self.hospital.registry.add_department(id, &name)?;
        self.print_table(
            &["dept_id", "name"],
            &[vec![department.id.to_string(), department.name]],
        )?;
        Ok(())
    }

    fn add_doctor(&mut self) -> anyhow::Result<()> {
        let id = self.prompt_id("Enter new doctor's id (blank to generate)")?;
        let name = self.prompt("Enter new doctor's name")?;
        let specialty = self.prompt("Enter new doctor's specialty")?;
        let department = self.prompt_parse::<i64>("Enter new doctor's department id")?;
        let doctor = self
            .hospital
            .registry
            .add_doctor(id, &name, &specialty, department)?;
        self.print_table(
            &["doctor_id", "name", "specialty", "did"],
            &[vec![
                doctor.id.to_string(),
                doctor.name,
                doctor.specialty,
                doctor.department.to_string(),
            ]],
        )?;
        Ok(())
    }

    fn add_patient(&mut self) -> anyhow::Result<()> {
        let id = self.prompt_id("Enter new patient's id (blank to generate)")?;
        let name = self.prompt("Enter new patient's name")?;
        let gender = self.prompt_parse::<Gender>("Enter new patient's gender (M/F/O)")?;
        let age = self.prompt_parse::<i64>("Enter new patient's age")?;
        let address = self.prompt("Enter new patient's address")?;
        let patient = self
            .hospital
            .registry
            .add_patient(id, &name, gender, age, &address)?;
        self.print_table(
            &["patient_id", "name", "gtype", "age", "address", "number_of_appts"],
            &[vec![
                patient.id.to_string(),
                patient.name,
                patient.gender.code().to_string(),
                patient.age.to_string(),
                patient.address,
                patient.appointment_count.to_string(),
            ]],
        )?;
        Ok(())
    }

    fn add_appointment(&mut self) -> anyhow::Result<()> {
        let id = self.prompt_id("Enter new appointment's id (blank to generate)")?;
        let doctor = self.prompt_parse::<i64>("Enter the doctor's id")?;
        let date = self.prompt_date("Enter the appointment's date (YYYY-MM-DD)")?;
        let time_slot = self.prompt_parse::<TimeSlot>("Enter the time slot (HH:MM-HH:MM)")?;
        let appointment = self
            .hospital
            .registry
            .add_appointment(id, doctor, date, time_slot)?;
        self.print_table(&APPOINTMENT_HEADER, &[appointment_row(&appointment)])?;
        Ok(())
    }

    fn make_appointment(&mut self) -> anyhow::Result<()> {
        let patient = self.prompt_parse::<i64>("Enter the patient's id")?;
        let doctor = self.prompt_parse::<i64>("Enter the doctor's id")?;
        let appointment = self.prompt_parse::<i64>("Enter the appointment's id")?;
        let outcome = self.hospital.coordinator.book(patient, doctor, appointment)?;
        writeln!(
            self.output,
            "appnt_id\tpatient_id\tprevious\tstatus\n{}\t{}\t{}\t{}",
            outcome.appointment, outcome.patient, outcome.previous, outcome.status
        )?;
        writeln!(self.output, "total row(s): {}", outcome.rows_affected)?;
        Ok(())
    }

    fn appointments_of_doctor(&mut self) -> anyhow::Result<()> {
        let doctor = self.prompt_parse::<i64>("Enter the doctor's id")?;
        let from = self.prompt_date("Enter the first date (YYYY-MM-DD)")?;
        let to = self.prompt_date("Enter the last date (YYYY-MM-DD)")?;
        let rows = self
            .hospital
            .reports
            .appointments_of_doctor(doctor, from, to)?
            .iter()
            .map(appointment_row)
            .collect::<Vec<_>>();
        self.print_table(&APPOINTMENT_HEADER, &rows)?;
        Ok(())
    }

    fn available_appointments_of_department(&mut self) -> anyhow::Result<()> {
        let name = self.prompt("Enter the department's name")?;
        let date = self.prompt_date("Enter the date (YYYY-MM-DD)")?;
        let rows = self
            .hospital
            .reports
            .available_appointments_of_department(&name, date)?
            .iter()
            .map(|found| {
                let mut row = appointment_row(&found.appointment);
                row.push(found.doctor.to_string());
                row
            })
            .collect::<Vec<_>>();
        self.print_table(
            &["appnt_id", "adate", "time_slot", "status", "doctor_id"],
            &rows,
        )?;
        Ok(())
    }

    fn appointment_counts_per_doctor(&mut self) -> anyhow::Result<()> {
        let rows = self
            .hospital
            .reports
            .appointment_counts_per_doctor()?
            .into_iter()
            .map(|c| {
                let total = c.total();
                vec![
                    c.doctor.to_string(),
                    c.name,
                    c.available.to_string(),
                    c.active.to_string(),
                    c.waitlisted.to_string(),
                    c.past.to_string(),
                    total.to_string(),
                ]
            })
            .collect::<Vec<_>>();
        self.print_table(&["doctor_id", "name", "AV", "AC", "WL", "PA", "count"], &rows)?;
        Ok(())
    }

    fn patient_counts_with_status(&mut self) -> anyhow::Result<()> {
        let status = self.prompt_parse::<AppointmentStatus>("Enter the status (AV/AC/WL/PA)")?;
        let rows = self
            .hospital
            .reports
            .patient_counts_with_status(status)?
            .into_iter()
            .map(|c| vec![c.doctor.to_string(), c.patients.to_string()])
            .collect::<Vec<_>>();
        self.print_table(&["doctor_id", "pcount"], &rows)?;
        Ok(())
    }

    fn expire_past(&mut self) -> anyhow::Result<()> {
        let line = self.prompt("Enter today's date (blank for the system date)")?;
        let today = if line.is_empty() {
            chrono::Local::now().date_naive()
        } else {
            parse_date(&line)?
        };
        let report = self.hospital.lifecycle.expire_past(today)?;
        writeln!(
            self.output,
            "expired appointments: {}, patients released: {}",
            report.appointments, report.patients
        )?;
        Ok(())
    }
}

const APPOINTMENT_HEADER: [&str; 4] = ["appnt_id", "adate", "time_slot", "status"];

fn appointment_row(appointment: &Appointment) -> Vec<String> {
    vec![
        appointment.id.to_string(),
        appointment.date.format("%Y-%m-%d").to_string(),
        appointment.time_slot.to_string(),
        appointment.status.code().to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use std::io::{self, Cursor};

    use super::run;
    use hospital_db::{
        config::{Config, RetryPolicy},
        sql::engine::KVEngine,
        storage::{disk::DiskEngine, memory::MemoryEngine},
    };

    fn session(script: &str) -> anyhow::Result<String> {
        let mut output = Vec::new();
        let config = Config::new(None, RetryPolicy::default())?;
        run(
            KVEngine::new(MemoryEngine::new())?,
            &config,
            Cursor::new(script.to_string()),
            &mut output,
        )?;
        Ok(String::from_utf8(output)?)
    }

    #[test]
    fn test_booking_session() -> anyhow::Result<()> {
        let script = [
            "1", "", "Cardiology",
            "2", "10", "Dr. Grey", "cardiology", "1",
            "3", "77", "Ada", "f", "36", "1 Main St",
            "3", "88", "Bob", "m", "52", "2 Main St",
            "4", "550", "10", "11/03/2026", "09:00-09:30",
            "5", "77", "10", "550",
            "5", "88", "10", "550",
            "9", "WL",
            "11",
        ]
        .join("\n");
        let output = session(&script)?;

        assert!(output.contains("550\t2026-11-03\t09:00-09:30\tAV\n"));
        assert!(output.contains("550\t77\tAVAILABLE\tACTIVE\ntotal row(s): 3\n"));
        assert!(output.contains("550\t88\tACTIVE\tWAITLISTED\ntotal row(s): 3\n"));
        assert!(output.contains("doctor_id\tpcount\n10\t2\ntotal row(s): 1\n"));
        assert!(output.ends_with("Bye!\n"));
        Ok(())
    }

    #[test]
    fn test_invalid_input_recovers() -> anyhow::Result<()> {
        let script = ["0", "abc", "5", "77", "10", "550", "3", "", "Ada", "x", "12"].join("\n");
        let output = session(&script)?;

        assert_eq!(output.matches("Your input is invalid!").count(), 3);
        assert!(output.contains("error: appointment 550 not found"));
        assert!(output.contains("error: invalid"));
        assert!(output.ends_with("Bye!\n"));
        Ok(())
    }

    #[test]
    fn test_data_file_survives_restart() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("hospital.db");
        let config = Config::new(Some(path.clone()), RetryPolicy::default())?;

        let script = ["1", "", "Cardiology", "11"].join("\n");
        run(KVEngine::new(DiskEngine::open(&path)?)?, &config, Cursor::new(script), io::sink())?;

        let mut output = Vec::new();
        let script = ["1", "", "Neurology", "11"].join("\n");
        run(KVEngine::new(DiskEngine::open(&path)?)?, &config, Cursor::new(script), &mut output)?;
        assert!(String::from_utf8(output)?.contains("2\tNeurology\n"));
        Ok(())
    }
}
