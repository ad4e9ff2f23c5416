//! Table layout of the hospital schema and typed row lookups.

use crate::{
    error::{Entity, Error, Result},
    sql::{
        engine::{Engine, Transaction},
        schema::{Column, Table},
        statement::Select,
        types::{cell, DataType},
    },
};

use super::model::{
    Appointment, AppointmentId, Department, DepartmentId, Doctor, DoctorId, Patient, PatientId,
};

pub mod department {
    pub const TABLE: &str = "department";
    pub const ID: &str = "dept_id";
    pub const NAME: &str = "name";
}

pub mod doctor {
    pub const TABLE: &str = "doctor";
    pub const ID: &str = "doctor_id";
    pub const NAME: &str = "name";
    pub const SPECIALTY: &str = "specialty";
    pub const DEPARTMENT: &str = "did";
}

pub mod patient {
    pub const TABLE: &str = "patient";
    pub const ID: &str = "patient_id";
    pub const NAME: &str = "name";
    pub const GENDER: &str = "gtype";
    pub const AGE: &str = "age";
    pub const ADDRESS: &str = "address";
    pub const APPOINTMENT_COUNT: &str = "number_of_appts";
}

pub mod appointment {
    pub const TABLE: &str = "appointment";
    pub const ID: &str = "appnt_id";
    pub const DATE: &str = "adate";
    pub const TIME_SLOT: &str = "time_slot";
    pub const STATUS: &str = "status";
}

/// Which doctor owns an appointment, keyed by appointment
pub mod has_appointment {
    pub const TABLE: &str = "has_appointment";
    pub const APPOINTMENT: &str = "appt_id";
    pub const DOCTOR: &str = "doctor_id";
}

/// Booking intents, one per patient and appointment
pub mod searches {
    pub const TABLE: &str = "searches";
    pub const PATIENT: &str = "pid";
    pub const APPOINTMENT: &str = "aid";
}

pub fn schemas() -> Vec<Table> {
    vec![
        Table::new(department::TABLE)
            .column(Column::new(department::ID, DataType::Integer).primary_key())
            .column(Column::new(department::NAME, DataType::String)),
        Table::new(doctor::TABLE)
            .column(Column::new(doctor::ID, DataType::Integer).primary_key())
            .column(Column::new(doctor::NAME, DataType::String))
            .column(Column::new(doctor::SPECIALTY, DataType::String))
            .column(Column::new(doctor::DEPARTMENT, DataType::Integer)),
        Table::new(patient::TABLE)
            .column(Column::new(patient::ID, DataType::Integer).primary_key())
            .column(Column::new(patient::NAME, DataType::String))
            .column(Column::new(patient::GENDER, DataType::String))
            .column(Column::new(patient::AGE, DataType::Integer))
            .column(Column::new(patient::ADDRESS, DataType::String))
            .column(Column::new(patient::APPOINTMENT_COUNT, DataType::Integer).default(0i64)),
        Table::new(appointment::TABLE)
            .column(Column::new(appointment::ID, DataType::Integer).primary_key())
            .column(Column::new(appointment::DATE, DataType::Date))
            .column(Column::new(appointment::TIME_SLOT, DataType::String))
            .column(Column::new(appointment::STATUS, DataType::String).default("AV")),
        Table::new(has_appointment::TABLE)
            .column(Column::new(has_appointment::APPOINTMENT, DataType::Integer).primary_key())
            .column(Column::new(has_appointment::DOCTOR, DataType::Integer)),
        Table::new(searches::TABLE)
            .column(Column::new(searches::PATIENT, DataType::Integer).primary_key())
            .column(Column::new(searches::APPOINTMENT, DataType::Integer).primary_key()),
    ]
}

/// Creates the tables that do not exist yet. Returns how many were created.
pub fn bootstrap<E: Engine>(engine: &E) -> Result<usize> {
    let created = engine.transact(|txn| {
        let mut created = 0;
        for table in schemas() {
            if txn.get_table(&table.name)?.is_none() {
                txn.create_table(table)?;
                created += 1;
            }
        }
        Ok(created)
    })?;
    if created > 0 {
        tracing::info!(created, "created hospital tables");
    }
    Ok(created)
}

pub(crate) fn find_department<T: Transaction>(
    txn: &mut T,
    id: DepartmentId,
) -> Result<Option<Department>> {
    let rows = txn.query(Select::new(department::TABLE).where_eq(department::ID), &[id.into()])?;
    rows.first().map(Department::from_row).transpose()
}

pub(crate) fn find_doctor<T: Transaction>(txn: &mut T, id: DoctorId) -> Result<Option<Doctor>> {
    let rows = txn.query(Select::new(doctor::TABLE).where_eq(doctor::ID), &[id.into()])?;
    rows.first().map(Doctor::from_row).transpose()
}

pub(crate) fn find_patient<T: Transaction>(txn: &mut T, id: PatientId) -> Result<Option<Patient>> {
    let rows = txn.query(Select::new(patient::TABLE).where_eq(patient::ID), &[id.into()])?;
    rows.first().map(Patient::from_row).transpose()
}

pub(crate) fn find_appointment<T: Transaction>(
    txn: &mut T,
    id: AppointmentId,
) -> Result<Option<Appointment>> {
    let rows = txn.query(Select::new(appointment::TABLE).where_eq(appointment::ID), &[id.into()])?;
    rows.first().map(Appointment::from_row).transpose()
}

/// Owning doctor of an appointment
pub(crate) fn find_owner<T: Transaction>(
    txn: &mut T,
    appointment: AppointmentId,
) -> Result<Option<DoctorId>> {
    let rows = txn.query(
        Select::new(has_appointment::TABLE).where_eq(has_appointment::APPOINTMENT),
        &[appointment.into()],
    )?;
    rows.first().map(|row| cell(row, 1).and_then(|v| v.as_integer())).transpose()
}

pub(crate) fn must_find<T>(entity: Entity, id: i64, found: Option<T>) -> Result<T> {
    found.ok_or_else(|| Error::not_found(entity, id))
}

#[cfg(test)]
mod tests {
    use super::{bootstrap, schemas};
    use crate::{
        error::Result,
        sql::engine::{Engine, KVEngine, Transaction},
        storage::memory::MemoryEngine,
    };

    #[test]
    fn test_bootstrap_is_idempotent() -> Result<()> {
        let engine = KVEngine::new(MemoryEngine::new())?;
        assert_eq!(bootstrap(&engine)?, schemas().len());
        assert_eq!(bootstrap(&engine)?, 0);

        let txn = engine.begin()?;
        for table in schemas() {
            assert_eq!(txn.get_table(&table.name)?, Some(table));
        }
        Ok(())
    }

    #[test]
    fn test_schemas_are_valid() -> Result<()> {
        for table in schemas() {
            table.validate()?;
        }
        Ok(())
    }
}
