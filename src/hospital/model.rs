use std::{fmt::Display, str::FromStr};

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Entity, Error, Result},
    sql::types::{cell, Row, Value},
};

pub type DepartmentId = i64;
pub type DoctorId = i64;
pub type PatientId = i64;
pub type AppointmentId = i64;

/// Oldest age accepted for a patient
pub const MAX_AGE: i64 = 150;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Doctor {
    pub id: DoctorId,
    pub name: String,
    pub specialty: String,
    pub department: DepartmentId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: PatientId,
    pub name: String,
    pub gender: Gender,
    pub age: i64,
    pub address: String,
    /// Bookings this patient holds on appointments that have not yet passed
    pub appointment_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub date: NaiveDate,
    pub time_slot: TimeSlot,
    pub status: AppointmentStatus,
}

/// Appointment lifecycle state, stored as its two-letter code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AppointmentStatus {
    Available,
    Active,
    Waitlisted,
    Past,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 4] = [
        AppointmentStatus::Available,
        AppointmentStatus::Active,
        AppointmentStatus::Waitlisted,
        AppointmentStatus::Past,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            AppointmentStatus::Available => "AV",
            AppointmentStatus::Active => "AC",
            AppointmentStatus::Waitlisted => "WL",
            AppointmentStatus::Past => "PA",
        }
    }

    /// Status after one more patient books the appointment. `None` means
    /// the appointment can no longer be booked and nothing changes.
    pub fn after_booking(&self) -> Option<AppointmentStatus> {
        match self {
            AppointmentStatus::Available => Some(AppointmentStatus::Active),
            AppointmentStatus::Active | AppointmentStatus::Waitlisted => {
                Some(AppointmentStatus::Waitlisted)
            }
            AppointmentStatus::Past => None,
        }
    }
}

impl Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AppointmentStatus::Available => "AVAILABLE",
            AppointmentStatus::Active => "ACTIVE",
            AppointmentStatus::Waitlisted => "WAITLISTED",
            AppointmentStatus::Past => "PAST",
        };
        f.write_str(name)
    }
}

/// Accepts the stored code (`AV`) or the full name (`available`)
impl FromStr for AppointmentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|status| {
                status.code().eq_ignore_ascii_case(s) || status.to_string().eq_ignore_ascii_case(s)
            })
            .ok_or_else(|| Error::Validation(format!("unknown appointment status {:?}", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn code(&self) -> &'static str {
        match self {
            Gender::Male => "M",
            Gender::Female => "F",
            Gender::Other => "O",
        }
    }
}

impl FromStr for Gender {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "m" | "male" => Ok(Gender::Male),
            "f" | "female" => Ok(Gender::Female),
            "o" | "other" => Ok(Gender::Other),
            other => Err(Error::Validation(format!(
                "gender must be M, F or O, got {:?}",
                other
            ))),
        }
    }
}

/// Time of day an appointment occupies, written `HH:MM-HH:MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeSlot {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self> {
        if start >= end {
            return Err(Error::Validation(format!(
                "time slot must start before it ends, got {}-{}",
                start.format("%H:%M"),
                end.format("%H:%M")
            )));
        }
        Ok(Self { start, end })
    }
}

impl FromStr for TimeSlot {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (start, end) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| Error::Validation(format!("time slot {:?} is not HH:MM-HH:MM", s)))?;
        let start = NaiveTime::parse_from_str(start.trim(), "%H:%M")?;
        let end = NaiveTime::parse_from_str(end.trim(), "%H:%M")?;
        Self::new(start, end)
    }
}

impl Display for TimeSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

/// Parses a date given as `YYYY-MM-DD` or `MM/DD/YYYY`
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%m/%d/%Y"))
        .map_err(|_| Error::Validation(format!("date {:?} is not YYYY-MM-DD or MM/DD/YYYY", s)))
}

/// Identifiers are positive
pub fn check_id(entity: Entity, id: i64) -> Result<()> {
    if id <= 0 {
        return Err(Error::Validation(format!("{} id must be positive, got {}", entity, id)));
    }
    Ok(())
}

/// Trimmed, non-empty text field
pub(crate) fn check_text(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::Validation(format!("{} cannot be empty", field)));
    }
    Ok(value.to_string())
}

fn integer(row: &Row, index: usize) -> Result<i64> {
    cell(row, index)?.as_integer()
}

fn text(row: &Row, index: usize) -> Result<String> {
    Ok(cell(row, index)?.as_str()?.to_string())
}

impl Department {
    pub(crate) fn to_row(&self) -> Row {
        vec![self.id.into(), self.name.clone().into()]
    }

    pub(crate) fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: integer(row, 0)?,
            name: text(row, 1)?,
        })
    }
}

impl Doctor {
    pub(crate) fn to_row(&self) -> Row {
        vec![
            self.id.into(),
            self.name.clone().into(),
            self.specialty.clone().into(),
            self.department.into(),
        ]
    }

    pub(crate) fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: integer(row, 0)?,
            name: text(row, 1)?,
            specialty: text(row, 2)?,
            department: integer(row, 3)?,
        })
    }
}

impl Patient {
    pub(crate) fn to_row(&self) -> Row {
        vec![
            self.id.into(),
            self.name.clone().into(),
            self.gender.code().into(),
            self.age.into(),
            self.address.clone().into(),
            self.appointment_count.into(),
        ]
    }

    pub(crate) fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: integer(row, 0)?,
            name: text(row, 1)?,
            gender: text(row, 2)?.parse().map_err(corrupt)?,
            age: integer(row, 3)?,
            address: text(row, 4)?,
            appointment_count: integer(row, 5)?,
        })
    }
}

impl Appointment {
    pub(crate) fn to_row(&self) -> Row {
        vec![
            self.id.into(),
            self.date.into(),
            self.time_slot.to_string().into(),
            self.status.code().into(),
        ]
    }

    pub(crate) fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: integer(row, 0)?,
            date: cell(row, 1)?.as_date()?,
            time_slot: text(row, 2)?.parse().map_err(corrupt)?,
            status: text(row, 3)?.parse().map_err(corrupt)?,
        })
    }
}

/// A stored value that no longer parses is damaged data, not bad input
fn corrupt(err: Error) -> Error {
    Error::Internal(format!("corrupt stored value: {}", err))
}

impl From<AppointmentStatus> for Value {
    fn from(value: AppointmentStatus) -> Self {
        Value::String(value.code().to_string())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{check_id, parse_date, Appointment, AppointmentStatus, Gender, Patient, TimeSlot};
    use crate::error::{Entity, Error, Result};

    #[test]
    fn test_status_transitions() {
        use AppointmentStatus::*;
        assert_eq!(Available.after_booking(), Some(Active));
        assert_eq!(Active.after_booking(), Some(Waitlisted));
        assert_eq!(Waitlisted.after_booking(), Some(Waitlisted));
        assert_eq!(Past.after_booking(), None);
    }

    #[test]
    fn test_status_parse() -> Result<()> {
        assert_eq!("AV".parse::<AppointmentStatus>()?, AppointmentStatus::Available);
        assert_eq!("wl".parse::<AppointmentStatus>()?, AppointmentStatus::Waitlisted);
        assert_eq!(" active ".parse::<AppointmentStatus>()?, AppointmentStatus::Active);
        assert_eq!("PAST".parse::<AppointmentStatus>()?, AppointmentStatus::Past);
        assert!("booked".parse::<AppointmentStatus>().is_err());
        Ok(())
    }

    #[test]
    fn test_gender_parse() -> Result<()> {
        assert_eq!("m".parse::<Gender>()?, Gender::Male);
        assert_eq!("Female".parse::<Gender>()?, Gender::Female);
        assert_eq!("O".parse::<Gender>()?, Gender::Other);
        assert!(matches!("x".parse::<Gender>(), Err(Error::Validation(_))));
        Ok(())
    }

    #[test]
    fn test_time_slot() -> Result<()> {
        let slot: TimeSlot = "09:00-09:30".parse()?;
        assert_eq!(slot.to_string(), "09:00-09:30");
        assert_eq!(" 08:05 - 10:00 ".parse::<TimeSlot>()?.to_string(), "08:05-10:00");
        assert!("10:00-09:00".parse::<TimeSlot>().is_err());
        assert!("10:00-10:00".parse::<TimeSlot>().is_err());
        assert!("10:00".parse::<TimeSlot>().is_err());
        assert!("25:00-26:00".parse::<TimeSlot>().is_err());
        Ok(())
    }

    #[test]
    fn test_parse_date() -> Result<()> {
        let expected = NaiveDate::from_ymd_opt(2026, 3, 14).expect("valid date");
        assert_eq!(parse_date("2026-03-14")?, expected);
        assert_eq!(parse_date("03/14/2026")?, expected);
        assert!(matches!(parse_date("14.03.2026"), Err(Error::Validation(_))));
        assert!(parse_date("2026-02-30").is_err());
        Ok(())
    }

    #[test]
    fn test_check_id() {
        assert!(check_id(Entity::Patient, 1).is_ok());
        assert!(matches!(check_id(Entity::Patient, 0), Err(Error::Validation(_))));
        assert!(check_id(Entity::Doctor, -3).is_err());
    }

    #[test]
    fn test_rows() -> Result<()> {
        let patient = Patient {
            id: 77,
            name: "Ada".into(),
            gender: Gender::Female,
            age: 36,
            address: "1 Main St".into(),
            appointment_count: 2,
        };
        assert_eq!(Patient::from_row(&patient.to_row())?, patient);

        let appointment = Appointment {
            id: 550,
            date: NaiveDate::from_ymd_opt(2026, 11, 3).expect("valid date"),
            time_slot: "09:00-09:30".parse()?,
            status: AppointmentStatus::Waitlisted,
        };
        let row = appointment.to_row();
        assert_eq!(row[3], "WL".into());
        assert_eq!(Appointment::from_row(&row)?, appointment);

        assert!(matches!(Appointment::from_row(&row[..2].to_vec()), Err(Error::Internal(_))));
        Ok(())
    }
}
