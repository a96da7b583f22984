//! Typed rows of the school collections

mod activity;
mod profile;
mod school;

pub use activity::{
    Announcement, Attendance, AttendanceStatus, Audience, Lecture, LectureStatus, Priority,
};
pub use profile::{next_stamp, NewProfile, NewProfileFields, Profile, ProfilePatch, ProfileUpdate};
pub use school::{Class, NameRef, ParentStudent, School, Student, Subject, Teacher};

/// Collection names in the row store
pub mod tables {
    pub const PROFILES: &str = "profiles";
    pub const SCHOOLS: &str = "schools";
    pub const SUBJECTS: &str = "subjects";
    pub const CLASSES: &str = "classes";
    pub const STUDENTS: &str = "students";
    pub const TEACHERS: &str = "teachers";
    pub const PARENT_STUDENTS: &str = "parent_students";
    pub const ATTENDANCE: &str = "attendance";
    pub const LECTURES: &str = "lectures";
    pub const ANNOUNCEMENTS: &str = "announcements";
}
