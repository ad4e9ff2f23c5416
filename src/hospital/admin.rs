use chrono::NaiveDate;

use crate::{
    config::RetryPolicy,
    error::{Entity, Error, Result},
    sql::{
        engine::{Engine, Transaction},
        statement::Insert,
    },
};

use super::{
    model::{
        check_id, check_text, Appointment, AppointmentId, AppointmentStatus, Department,
        DepartmentId, Doctor, DoctorId, Gender, Patient, PatientId, TimeSlot, MAX_AGE,
    },
    tables::{self, appointment, department, doctor, has_appointment, patient},
    with_retry,
};

/// Registration of departments, doctors, patients and appointment slots.
///
/// Every operation runs in its own transaction. Ids are taken from the
/// table's sequence unless the caller supplies one.
pub struct Registry<E: Engine> {
    engine: E,
    retry: RetryPolicy,
}

impl<E: Engine> Clone for Registry<E> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            retry: self.retry,
        }
    }
}

impl<E: Engine> Registry<E> {
    pub fn new(engine: E, retry: RetryPolicy) -> Self {
        Self { engine, retry }
    }

    pub fn add_department(&self, id: Option<DepartmentId>, name: &str) -> Result<Department> {
        let name = check_text("department name", name)?;
        let department = with_retry(self.retry, "add_department", || {
            self.engine.transact(|txn| {
                let department = Department {
                    id: allocate(txn, Entity::Department, department::TABLE, id)?,
                    name: name.clone(),
                };
                txn.execute(Insert::new(department::TABLE), &department.to_row())?;
                Ok(department)
            })
        })?;
        tracing::info!(id = department.id, "added department");
        Ok(department)
    }

    pub fn add_doctor(
        &self,
        id: Option<DoctorId>,
        name: &str,
        specialty: &str,
        department: DepartmentId,
    ) -> Result<Doctor> {
        let name = check_text("doctor name", name)?;
        let specialty = check_text("specialty", specialty)?;
        check_id(Entity::Department, department)?;

        let doctor = with_retry(self.retry, "add_doctor", || {
            self.engine.transact(|txn| {
                tables::must_find(
                    Entity::Department,
                    department,
                    tables::find_department(txn, department)?,
                )?;
                let doctor = Doctor {
                    id: allocate(txn, Entity::Doctor, doctor::TABLE, id)?,
                    name: name.clone(),
                    specialty: specialty.clone(),
                    department,
                };
                txn.execute(Insert::new(doctor::TABLE), &doctor.to_row())?;
                Ok(doctor)
            })
        })?;
        tracing::info!(id = doctor.id, department, "added doctor");
        Ok(doctor)
    }

    pub fn add_patient(
        &self,
        id: Option<PatientId>,
        name: &str,
        gender: Gender,
        age: i64,
        address: &str,
    ) -> Result<Patient> {
        let name = check_text("patient name", name)?;
        let address = check_text("address", address)?;
        if !(0..=MAX_AGE).contains(&age) {
            return Err(Error::Validation(format!(
                "age must be between 0 and {}, got {}",
                MAX_AGE, age
            )));
        }

        let patient = with_retry(self.retry, "add_patient", || {
            self.engine.transact(|txn| {
                let patient = Patient {
                    id: allocate(txn, Entity::Patient, patient::TABLE, id)?,
                    name: name.clone(),
                    gender,
                    age,
                    address: address.clone(),
                    appointment_count: 0,
                };
                txn.execute(Insert::new(patient::TABLE), &patient.to_row())?;
                Ok(patient)
            })
        })?;
        tracing::info!(id = patient.id, "added patient");
        Ok(patient)
    }

    /// Adds an AVAILABLE appointment slot owned by `doctor`
    pub fn add_appointment(
        &self,
        id: Option<AppointmentId>,
        doctor: DoctorId,
        date: NaiveDate,
        time_slot: TimeSlot,
    ) -> Result<Appointment> {
        check_id(Entity::Doctor, doctor)?;

        let appointment = with_retry(self.retry, "add_appointment", || {
            self.engine.transact(|txn| {
                tables::must_find(Entity::Doctor, doctor, tables::find_doctor(txn, doctor)?)?;
                let appointment = Appointment {
                    id: allocate(txn, Entity::Appointment, appointment::TABLE, id)?,
                    date,
                    time_slot,
                    status: AppointmentStatus::Available,
                };
                txn.execute(Insert::new(appointment::TABLE), &appointment.to_row())?;
                txn.execute(
                    Insert::new(has_appointment::TABLE),
                    &[appointment.id.into(), doctor.into()],
                )?;
                Ok(appointment)
            })
        })?;
        tracing::info!(id = appointment.id, doctor, %date, "added appointment");
        Ok(appointment)
    }

    pub fn department(&self, id: DepartmentId) -> Result<Department> {
        self.engine.transact(|txn| {
            tables::must_find(Entity::Department, id, tables::find_department(txn, id)?)
        })
    }

    pub fn doctor(&self, id: DoctorId) -> Result<Doctor> {
        self.engine
            .transact(|txn| tables::must_find(Entity::Doctor, id, tables::find_doctor(txn, id)?))
    }

    pub fn patient(&self, id: PatientId) -> Result<Patient> {
        self.engine
            .transact(|txn| tables::must_find(Entity::Patient, id, tables::find_patient(txn, id)?))
    }

    pub fn appointment(&self, id: AppointmentId) -> Result<Appointment> {
        self.engine.transact(|txn| {
            tables::must_find(Entity::Appointment, id, tables::find_appointment(txn, id)?)
        })
    }
}

/// The caller's id if given, otherwise the next one from the table sequence.
/// Inserting a row with an explicit id moves the sequence past it.
fn allocate<T: Transaction>(
    txn: &mut T,
    entity: Entity,
    table: &str,
    id: Option<i64>,
) -> Result<i64> {
    match id {
        Some(id) => {
            check_id(entity, id)?;
            Ok(id)
        }
        None => txn.next_sequence(table),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::Registry;
    use crate::{
        config::RetryPolicy,
        error::{Entity, Error, Result},
        hospital::{
            model::{AppointmentStatus, Gender},
            tables,
        },
        sql::engine::KVEngine,
        storage::memory::MemoryEngine,
    };

    fn registry() -> Result<Registry<KVEngine<MemoryEngine>>> {
        let engine = KVEngine::new(MemoryEngine::new())?;
        tables::bootstrap(&engine)?;
        Ok(Registry::new(engine, RetryPolicy::default()))
    }

    #[test]
    fn test_generated_ids() -> Result<()> {
        let registry = registry()?;
        let cardiology = registry.add_department(None, "Cardiology")?;
        assert_eq!(cardiology.id, 1);
        let neurology = registry.add_department(None, " Neurology ")?;
        assert_eq!(neurology.id, 2);
        assert_eq!(registry.department(2)?.name, "Neurology");

        // explicit ids move the sequence past them
        registry.add_doctor(Some(10), "Dr. Grey", "cardiology", cardiology.id)?;
        let next = registry.add_doctor(None, "Dr. Shepherd", "neurology", neurology.id)?;
        assert_eq!(next.id, 11);
        Ok(())
    }

    #[test]
    fn test_doctor_needs_department() -> Result<()> {
        let registry = registry()?;
        assert_eq!(
            registry.add_doctor(None, "Dr. Grey", "cardiology", 4),
            Err(Error::not_found(Entity::Department, 4))
        );
        assert!(matches!(
            registry.add_doctor(None, "Dr. Grey", "cardiology", 0),
            Err(Error::Validation(_))
        ));
        Ok(())
    }

    #[test]
    fn test_patient_validation() -> Result<()> {
        let registry = registry()?;
        let patient = registry.add_patient(Some(77), "Ada", Gender::Female, 36, "1 Main St")?;
        assert_eq!(patient.appointment_count, 0);
        assert_eq!(registry.patient(77)?, patient);

        assert!(matches!(
            registry.add_patient(None, "Bob", Gender::Male, 151, "2 Main St"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            registry.add_patient(None, "Bob", Gender::Male, -1, "2 Main St"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            registry.add_patient(None, "  ", Gender::Male, 40, "2 Main St"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            registry.add_patient(Some(77), "Bob", Gender::Male, 40, "2 Main St"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            registry.add_patient(Some(-5), "Bob", Gender::Male, 40, "2 Main St"),
            Err(Error::Validation(_))
        ));
        assert_eq!(registry.patient(78), Err(Error::not_found(Entity::Patient, 78)));
        Ok(())
    }

    #[test]
    fn test_appointment_is_linked() -> Result<()> {
        let registry = registry()?;
        let department = registry.add_department(None, "Cardiology")?;
        let doctor = registry.add_doctor(Some(10), "Dr. Grey", "cardiology", department.id)?;
        let date = NaiveDate::from_ymd_opt(2026, 11, 3).expect("valid date");
        assert_eq!(registry.doctor(10)?, doctor);
        assert_eq!(registry.doctor(12), Err(Error::not_found(Entity::Doctor, 12)));

        let appointment = registry.add_appointment(Some(550), doctor.id, date, "09:00-09:30".parse()?)?;
        assert_eq!(appointment.status, AppointmentStatus::Available);
        assert_eq!(registry.appointment(550)?, appointment);

        assert_eq!(
            registry.add_appointment(None, 11, date, "09:00-09:30".parse()?),
            Err(Error::not_found(Entity::Doctor, 11))
        );
        // a failed insert leaves no linkage behind
        assert!(matches!(
            registry.add_appointment(Some(550), doctor.id, date, "10:00-10:30".parse()?),
            Err(Error::Validation(_))
        ));
        assert_eq!(registry.add_appointment(None, doctor.id, date, "10:00-10:30".parse()?)?.id, 551);
        Ok(())
    }
}
