use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::{
    config::RetryPolicy,
    error::Result,
    sql::{
        engine::{Engine, Transaction},
        statement::{Select, Update},
        types::cell,
    },
};

use super::{
    model::{Appointment, AppointmentStatus, PatientId},
    tables::{appointment, patient, searches},
    with_retry,
};

/// What an expiry run changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpiryReport {
    /// Appointments moved to PAST
    pub appointments: usize,
    /// Patients whose appointment count went down
    pub patients: usize,
}

/// Moves elapsed appointments to PAST. This is the only way an appointment
/// becomes PAST.
pub struct Lifecycle<E: Engine> {
    engine: E,
    retry: RetryPolicy,
}

impl<E: Engine> Lifecycle<E> {
    pub fn new(engine: E, retry: RetryPolicy) -> Self {
        Self { engine, retry }
    }

    /// Marks every appointment dated before `today` as PAST and releases the
    /// bookings patients held on them, in one transaction.
    pub fn expire_past(&self, today: NaiveDate) -> Result<ExpiryReport> {
        let report = with_retry(self.retry, "expire_past", || {
            self.engine.transact(|txn| expire(txn, today))
        })?;
        tracing::info!(
            %today,
            appointments = report.appointments,
            patients = report.patients,
            "expired past appointments"
        );
        Ok(report)
    }
}

fn expire<T: Transaction>(txn: &mut T, today: NaiveDate) -> Result<ExpiryReport> {
    let elapsed = txn
        .query(
            Select::new(appointment::TABLE).where_lt(appointment::DATE),
            &[today.into()],
        )?
        .iter()
        .map(Appointment::from_row)
        .collect::<Result<Vec<_>>>()?;

    let mut report = ExpiryReport::default();
    let mut released: BTreeMap<PatientId, i64> = BTreeMap::new();
    for slot in elapsed.iter().filter(|a| a.status != AppointmentStatus::Past) {
        let holders = txn.query(
            Select::new(searches::TABLE).where_eq(searches::APPOINTMENT),
            &[slot.id.into()],
        )?;
        for row in holders.iter() {
            *released.entry(cell(row, 0)?.as_integer()?).or_default() += 1;
        }
        txn.execute(
            Update::new(appointment::TABLE)
                .set(appointment::STATUS)
                .where_eq(appointment::ID),
            &[AppointmentStatus::Past.into(), slot.id.into()],
        )?;
        report.appointments += 1;
    }

    for (patient, count) in released.iter() {
        txn.execute(
            Update::new(patient::TABLE)
                .increment(patient::APPOINTMENT_COUNT)
                .where_eq(patient::ID),
            &[(-count).into(), (*patient).into()],
        )?;
        tracing::debug!(patient, released = count, "released bookings");
    }
    report.patients = released.len();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::NaiveDate;

    use super::{ExpiryReport, Lifecycle};
    use crate::{
        config::RetryPolicy,
        error::Result,
        hospital::{
            admin::Registry,
            booking::BookingCoordinator,
            model::{AppointmentStatus, Gender},
            tables,
        },
        sql::engine::KVEngine,
        storage::memory::MemoryEngine,
    };

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 11, d).expect("valid date")
    }

    #[test]
    fn test_expire_past() -> Result<()> {
        let engine = KVEngine::new(MemoryEngine::new())?;
        tables::bootstrap(&engine)?;
        let retry = RetryPolicy::new(3, Duration::ZERO)?;
        let registry = Registry::new(engine.clone(), retry);
        let coordinator = BookingCoordinator::new(engine.clone(), retry);
        let lifecycle = Lifecycle::new(engine, retry);

        let department = registry.add_department(None, "Oncology")?;
        let doctor = registry.add_doctor(None, "Dr. Bailey", "oncology", department.id)?;
        let patient = registry.add_patient(None, "Ada", Gender::Female, 36, "1 Main St")?;
        let early = registry.add_appointment(None, doctor.id, day(2), "09:00-09:30".parse()?)?;
        let due = registry.add_appointment(None, doctor.id, day(5), "09:00-09:30".parse()?)?;
        coordinator.book(patient.id, doctor.id, early.id)?;
        coordinator.book(patient.id, doctor.id, due.id)?;

        // dates before today only
        let report = lifecycle.expire_past(day(5))?;
        assert_eq!(report, ExpiryReport { appointments: 1, patients: 1 });
        assert_eq!(registry.appointment(early.id)?.status, AppointmentStatus::Past);
        assert_eq!(registry.appointment(due.id)?.status, AppointmentStatus::Active);
        assert_eq!(registry.patient(patient.id)?.appointment_count, 1);

        // already-past appointments are not released twice
        assert_eq!(lifecycle.expire_past(day(5))?, ExpiryReport::default());
        assert_eq!(registry.patient(patient.id)?.appointment_count, 1);

        let report = lifecycle.expire_past(day(30))?;
        assert_eq!(report, ExpiryReport { appointments: 1, patients: 1 });
        assert_eq!(registry.patient(patient.id)?.appointment_count, 0);
        Ok(())
    }
}
