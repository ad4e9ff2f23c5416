//! The booking coordinator.
//!
//! Booking an appointment touches three rows: the appointment's status, a
//! new booking intent in `searches`, and the patient's appointment count.
//! All three change in one transaction. The appointment row is claimed
//! first, so two bookings of the same slot can never both apply the
//! transition table to the same prior status; the later one conflicts, rolls
//! back and is retried against the committed result.

use crate::{
    config::RetryPolicy,
    error::{Entity, Error, Result},
    sql::{
        engine::{Engine, Transaction},
        statement::{Insert, Select, Update},
    },
};

use super::{
    model::{check_id, Appointment, AppointmentId, AppointmentStatus, DoctorId, PatientId},
    tables::{self, appointment, patient, searches},
    with_retry,
};

/// Result of a booking request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingOutcome {
    pub appointment: AppointmentId,
    pub patient: PatientId,
    /// Status before the booking
    pub previous: AppointmentStatus,
    /// Status after the booking
    pub status: AppointmentStatus,
    /// Rows inserted or updated; 0 when the appointment has passed
    pub rows_affected: usize,
}

pub struct BookingCoordinator<E: Engine> {
    engine: E,
    retry: RetryPolicy,
}

impl<E: Engine> Clone for BookingCoordinator<E> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            retry: self.retry,
        }
    }
}

impl<E: Engine> BookingCoordinator<E> {
    pub fn new(engine: E, retry: RetryPolicy) -> Self {
        Self { engine, retry }
    }

    /// Books `appointment` of `doctor` for `patient`.
    ///
    /// | current    | new        |
    /// |------------|------------|
    /// | AVAILABLE  | ACTIVE     |
    /// | ACTIVE     | WAITLISTED |
    /// | WAITLISTED | WAITLISTED |
    /// | PAST       | PAST, nothing is written |
    ///
    /// Fails with `NotFound` for a missing patient, doctor or appointment,
    /// `LinkMismatch` when the appointment belongs to another doctor, and
    /// `TransactionConflict` when every retry lost a race. Nothing is written
    /// on failure.
    pub fn book(
        &self,
        patient: PatientId,
        doctor: DoctorId,
        appointment: AppointmentId,
    ) -> Result<BookingOutcome> {
        check_id(Entity::Patient, patient)?;
        check_id(Entity::Doctor, doctor)?;
        check_id(Entity::Appointment, appointment)?;

        let outcome = with_retry(self.retry, "book", || {
            self.engine
                .transact(|txn| apply(txn, patient, doctor, appointment))
        })?;
        tracing::info!(
            patient,
            doctor,
            appointment,
            previous = %outcome.previous,
            status = %outcome.status,
            rows = outcome.rows_affected,
            "booked appointment"
        );
        Ok(outcome)
    }
}

/// Applies one booking inside `txn`. The caller commits or rolls back.
pub(crate) fn apply<T: Transaction>(
    txn: &mut T,
    patient: PatientId,
    doctor: DoctorId,
    appointment: AppointmentId,
) -> Result<BookingOutcome> {
    let rows = txn.query(
        Select::new(appointment::TABLE)
            .where_eq(appointment::ID)
            .for_update(),
        &[appointment.into()],
    )?;
    let slot = match rows.first() {
        Some(row) => Appointment::from_row(row)?,
        None => return Err(Error::not_found(Entity::Appointment, appointment)),
    };

    tables::must_find(Entity::Patient, patient, tables::find_patient(txn, patient)?)?;
    tables::must_find(Entity::Doctor, doctor, tables::find_doctor(txn, doctor)?)?;
    if tables::find_owner(txn, appointment)? != Some(doctor) {
        return Err(Error::LinkMismatch { appointment, doctor });
    }

    let next = match slot.status.after_booking() {
        Some(next) => next,
        None => {
            tracing::debug!(appointment, "appointment has passed, nothing to book");
            return Ok(BookingOutcome {
                appointment,
                patient,
                previous: slot.status,
                status: slot.status,
                rows_affected: 0,
            });
        }
    };

    let held = txn.execute(
        Select::new(searches::TABLE)
            .where_eq(searches::PATIENT)
            .where_eq(searches::APPOINTMENT),
        &[patient.into(), appointment.into()],
    )?;
    if held > 0 {
        return Err(Error::Validation(format!(
            "patient {} already booked appointment {}",
            patient, appointment
        )));
    }

    let mut rows_affected = txn.execute(
        Insert::new(searches::TABLE),
        &[patient.into(), appointment.into()],
    )?;
    rows_affected += txn.execute(
        Update::new(patient::TABLE)
            .increment(patient::APPOINTMENT_COUNT)
            .where_eq(patient::ID),
        &[1i64.into(), patient.into()],
    )?;
    if next != slot.status {
        rows_affected += txn.execute(
            Update::new(appointment::TABLE)
                .set(appointment::STATUS)
                .where_eq(appointment::ID),
            &[next.into(), appointment.into()],
        )?;
    }

    Ok(BookingOutcome {
        appointment,
        patient,
        previous: slot.status,
        status: next,
        rows_affected,
    })
}
