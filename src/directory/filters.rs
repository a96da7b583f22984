//! Client-side filters over rows that were already fetched

use crate::models::{
    Announcement, Attendance, AttendanceStatus, Audience, Lecture, LectureStatus, Priority,
    Teacher,
};
use crate::util::round1;
use chrono::{Duration, NaiveDate};

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

/// Date window for the lecture list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LectureWindow {
    #[default]
    Today,
    Tomorrow,
    /// Today through seven days ahead
    ThisWeek,
    All,
}

impl LectureWindow {
    pub fn contains(self, date: NaiveDate, today: NaiveDate) -> bool {
        match self {
            LectureWindow::Today => date == today,
            LectureWindow::Tomorrow => date == today + Duration::days(1),
            LectureWindow::ThisWeek => date >= today && date <= today + Duration::days(7),
            LectureWindow::All => true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LectureFilter {
    pub window: LectureWindow,
    pub status: Option<LectureStatus>,
    /// Matched case-insensitively against title, subject, class and room
    pub search: String,
}

impl LectureFilter {
    pub fn matches(&self, lecture: &Lecture, today: NaiveDate) -> bool {
        if !self.window.contains(lecture.scheduled_date, today) {
            return false;
        }
        if self.status.map_or(false, |status| status != lecture.status) {
            return false;
        }

        let needle = self.search.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        contains_ci(&lecture.title, &needle)
            || lecture.subject_name().map_or(false, |s| contains_ci(s, &needle))
            || lecture.class_name().map_or(false, |c| contains_ci(c, &needle))
            || lecture.room.as_deref().map_or(false, |r| contains_ci(r, &needle))
    }

    pub fn apply<'a>(&self, lectures: &'a [Lecture], today: NaiveDate) -> Vec<&'a Lecture> {
        lectures
            .iter()
            .filter(|lecture| self.matches(lecture, today))
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnnouncementFilter {
    pub audience: Option<Audience>,
    pub priority: Option<Priority>,
    pub published: Option<bool>,
    /// Matched case-insensitively against title and content
    pub search: String,
}

impl AnnouncementFilter {
    pub fn matches(&self, announcement: &Announcement) -> bool {
        if self
            .audience
            .map_or(false, |audience| audience != announcement.target_audience)
        {
            return false;
        }
        if self
            .priority
            .map_or(false, |priority| priority != announcement.priority)
        {
            return false;
        }
        if self
            .published
            .map_or(false, |published| published != announcement.is_published)
        {
            return false;
        }

        let needle = self.search.trim().to_lowercase();
        needle.is_empty()
            || contains_ci(&announcement.title, &needle)
            || contains_ci(&announcement.content, &needle)
    }

    pub fn apply<'a>(&self, announcements: &'a [Announcement]) -> Vec<&'a Announcement> {
        announcements
            .iter()
            .filter(|announcement| self.matches(announcement))
            .collect()
    }
}

/// Counts per status for a set of attendance records
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AttendanceSummary {
    pub total: usize,
    pub present: usize,
    pub absent: usize,
    pub late: usize,
    pub excused: usize,
    /// Share of present or late records, in percent with one decimal
    pub rate: f64,
}

impl AttendanceSummary {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a Attendance>) -> Self {
        let mut summary = AttendanceSummary::default();
        for record in records {
            summary.total += 1;
            match record.status {
                AttendanceStatus::Present => summary.present += 1,
                AttendanceStatus::Absent => summary.absent += 1,
                AttendanceStatus::Late => summary.late += 1,
                AttendanceStatus::Excused => summary.excused += 1,
            }
        }
        if summary.total > 0 {
            let attended = (summary.present + summary.late) as f64;
            summary.rate = round1(attended / summary.total as f64 * 100.0);
        }
        summary
    }
}

/// Records for one day, optionally narrowed to a class and subject.
pub fn attendance_on<'a>(
    records: &'a [Attendance],
    date: NaiveDate,
    class_id: Option<&str>,
    subject_id: Option<&str>,
) -> Vec<&'a Attendance> {
    records
        .iter()
        .filter(|r| r.date == date)
        .filter(|r| class_id.map_or(true, |id| r.class_id == id))
        .filter(|r| subject_id.map_or(true, |id| r.subject_id.as_deref() == Some(id)))
        .collect()
}

/// Distinct departments, sorted.
pub fn teacher_departments(teachers: &[Teacher]) -> Vec<String> {
    let mut departments: Vec<String> = teachers
        .iter()
        .filter_map(|teacher| teacher.department.clone())
        .filter(|department| !department.trim().is_empty())
        .collect();
    departments.sort();
    departments.dedup();
    departments
}
