//! Read-only listings over the schedule.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::NaiveDate;

use crate::{
    error::{Entity, Error, Result},
    sql::{
        engine::{Engine, Transaction},
        statement::{OrderDirection, Select},
        types::cell,
    },
};

use super::{
    model::{Appointment, AppointmentId, AppointmentStatus, Doctor, DoctorId, PatientId},
    tables::{self, appointment, department, doctor, has_appointment, searches},
};

/// An appointment together with the doctor that owns it
#[derive(Debug, Clone, PartialEq)]
pub struct DoctorAppointment {
    pub doctor: DoctorId,
    pub appointment: Appointment,
}

/// Number of a doctor's appointments in each status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCounts {
    pub doctor: DoctorId,
    pub name: String,
    pub available: usize,
    pub active: usize,
    pub waitlisted: usize,
    pub past: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.available + self.active + self.waitlisted + self.past
    }

    fn add(&mut self, status: AppointmentStatus) {
        match status {
            AppointmentStatus::Available => self.available += 1,
            AppointmentStatus::Active => self.active += 1,
            AppointmentStatus::Waitlisted => self.waitlisted += 1,
            AppointmentStatus::Past => self.past += 1,
        }
    }
}

/// Distinct patients holding bookings on a doctor's appointments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatientCount {
    pub doctor: DoctorId,
    pub patients: usize,
}

pub struct Reports<E: Engine> {
    engine: E,
}

impl<E: Engine> Reports<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    /// ACTIVE and AVAILABLE appointments of `doctor` dated within
    /// `from..=to`, by date then id
    pub fn appointments_of_doctor(
        &self,
        doctor: DoctorId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Appointment>> {
        if from > to {
            return Err(Error::Validation(format!("date range {} to {} is empty", from, to)));
        }
        self.engine.transact(|txn| {
            tables::must_find(Entity::Doctor, doctor, tables::find_doctor(txn, doctor)?)?;
            let owned = owned_by(txn, &[doctor])?;
            txn.query(
                Select::new(appointment::TABLE)
                    .where_between(appointment::DATE)
                    .order_by(appointment::DATE, OrderDirection::Asc)
                    .order_by(appointment::ID, OrderDirection::Asc),
                &[from.into(), to.into()],
            )?
            .iter()
            .map(Appointment::from_row)
            .filter(|a| {
                a.as_ref().map_or(true, |a| {
                    owned.contains_key(&a.id)
                        && matches!(
                            a.status,
                            AppointmentStatus::Active | AppointmentStatus::Available
                        )
                })
            })
            .collect()
        })
    }

    /// AVAILABLE appointments on `date` whose doctor works in a department
    /// named `department_name`, by appointment id
    pub fn available_appointments_of_department(
        &self,
        department_name: &str,
        date: NaiveDate,
    ) -> Result<Vec<DoctorAppointment>> {
        let department_name = department_name.trim();
        self.engine.transact(|txn| {
            let departments = txn
                .query(
                    Select::new(department::TABLE).where_eq(department::NAME),
                    &[department_name.into()],
                )?
                .iter()
                .map(|row| cell(row, 0)?.as_integer())
                .collect::<Result<HashSet<_>>>()?;
            let doctors = all_doctors(txn)?
                .into_iter()
                .filter(|d| departments.contains(&d.department))
                .map(|d| d.id)
                .collect::<Vec<_>>();
            let owned = owned_by(txn, &doctors)?;

            let rows = txn.query(
                Select::new(appointment::TABLE)
                    .where_eq(appointment::DATE)
                    .where_eq(appointment::STATUS),
                &[date.into(), AppointmentStatus::Available.into()],
            )?;
            let mut found = Vec::new();
            for row in rows.iter() {
                let appointment = Appointment::from_row(row)?;
                if let Some(doctor) = owned.get(&appointment.id) {
                    found.push(DoctorAppointment { doctor: *doctor, appointment });
                }
            }
            Ok(found)
        })
    }

    /// Appointment counts by status for every doctor, most appointments
    /// first, ties by doctor id
    pub fn appointment_counts_per_doctor(&self) -> Result<Vec<StatusCounts>> {
        self.engine.transact(|txn| {
            let mut counts = all_doctors(txn)?
                .into_iter()
                .map(|d| {
                    let counts = StatusCounts {
                        doctor: d.id,
                        name: d.name,
                        available: 0,
                        active: 0,
                        waitlisted: 0,
                        past: 0,
                    };
                    (d.id, counts)
                })
                .collect::<BTreeMap<_, _>>();
            let owners = all_links(txn)?;

            for row in txn.query(Select::new(appointment::TABLE), &[])?.iter() {
                let appointment = Appointment::from_row(row)?;
                let entry = owners
                    .get(&appointment.id)
                    .and_then(|doctor| counts.get_mut(doctor));
                if let Some(entry) = entry {
                    entry.add(appointment.status);
                }
            }

            let mut counts = counts.into_values().collect::<Vec<_>>();
            counts.sort_by(|a, b| b.total().cmp(&a.total()).then(a.doctor.cmp(&b.doctor)));
            Ok(counts)
        })
    }

    /// Per doctor, the distinct patients booked on that doctor's
    /// appointments that are in `status`. Doctors without any are left out.
    pub fn patient_counts_with_status(&self, status: AppointmentStatus) -> Result<Vec<PatientCount>> {
        self.engine.transact(|txn| {
            let in_status = txn
                .query(
                    Select::new(appointment::TABLE).where_eq(appointment::STATUS),
                    &[status.into()],
                )?
                .iter()
                .map(|row| cell(row, 0)?.as_integer())
                .collect::<Result<HashSet<AppointmentId>>>()?;
            let owners = all_links(txn)?;

            let mut patients: BTreeMap<DoctorId, BTreeSet<PatientId>> = BTreeMap::new();
            for row in txn.query(Select::new(searches::TABLE), &[])?.iter() {
                let patient = cell(row, 0)?.as_integer()?;
                let appointment = cell(row, 1)?.as_integer()?;
                if !in_status.contains(&appointment) {
                    continue;
                }
                if let Some(doctor) = owners.get(&appointment) {
                    patients.entry(*doctor).or_default().insert(patient);
                }
            }

            Ok(patients
                .into_iter()
                .map(|(doctor, patients)| PatientCount { doctor, patients: patients.len() })
                .collect())
        })
    }
}

fn all_doctors<T: Transaction>(txn: &mut T) -> Result<Vec<Doctor>> {
    txn.query(Select::new(doctor::TABLE), &[])?
        .iter()
        .map(Doctor::from_row)
        .collect()
}

/// Owner of every appointment
fn all_links<T: Transaction>(txn: &mut T) -> Result<HashMap<AppointmentId, DoctorId>> {
    txn.query(Select::new(has_appointment::TABLE), &[])?
        .iter()
        .map(|row| -> Result<(AppointmentId, DoctorId)> {
            Ok((cell(row, 0)?.as_integer()?, cell(row, 1)?.as_integer()?))
        })
        .collect()
}

/// Appointments owned by any of `doctors`, with their owner
fn owned_by<T: Transaction>(
    txn: &mut T,
    doctors: &[DoctorId],
) -> Result<HashMap<AppointmentId, DoctorId>> {
    let mut owned = HashMap::new();
    for doctor in doctors {
        for row in txn
            .query(
                Select::new(has_appointment::TABLE).where_eq(has_appointment::DOCTOR),
                &[(*doctor).into()],
            )?
            .iter()
        {
            owned.insert(cell(row, 0)?.as_integer()?, *doctor);
        }
    }
    Ok(owned)
}
