//! Spoken announcements for kiosk outcomes.

use serde::Deserialize;

use crate::models::{Announcement, Graduate};

/// Words and voice parameters used to compose announcements.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Phrasebook {
    /// BCP 47 voice language
    pub lang: String,
    pub rate: f32,
    pub pitch: f32,
    /// Degree-type word prefixed to a degree that does not already start with it
    pub degree_word: String,
    /// Spoken in place of the degree when none is recorded
    pub default_title: String,
    /// Grouping word prefixed to the faculty
    pub faculty_word: String,
    pub not_found: String,
    /// `{name}` is replaced with the graduate's full name
    pub already_checked_in: String,
    pub failure: String,
    pub ready: String,
}

impl Default for Phrasebook {
    fn default() -> Self {
        Self {
            lang: "th-TH".to_string(),
            rate: 0.85,
            pitch: 1.0,
            degree_word: "ปริญญา".to_string(),
            default_title: "บัณฑิต".to_string(),
            faculty_word: "คณะ".to_string(),
            not_found: "ไม่พบรายชื่อในระบบครับ".to_string(),
            already_checked_in: "บัณฑิต {name} รายงานตัวแล้วครับ".to_string(),
            failure: "เกิดข้อผิดพลาดในการบันทึกครับ".to_string(),
            ready: "พร้อมใช้งานครับ".to_string(),
        }
    }
}

impl Phrasebook {
    fn speak(&self, text: String) -> Announcement {
        Announcement {
            text,
            lang: self.lang.clone(),
            rate: self.rate,
            pitch: self.pitch,
        }
    }

    pub fn degree_text(&self, degree: Option<&str>) -> String {
        match degree.map(str::trim).filter(|d| !d.is_empty()) {
            None => self.default_title.clone(),
            Some(d) if d.starts_with(self.degree_word.as_str()) => d.to_string(),
            Some(d) => format!("{}{}", self.degree_word, d),
        }
    }

    pub fn faculty_text(&self, faculty: &str) -> String {
        let faculty = faculty.trim();
        if faculty.is_empty() {
            String::new()
        } else {
            format!("{}{}", self.faculty_word, faculty)
        }
    }

    /// `"{degree_text} {faculty_text} {fullname}"`, skipping empty parts.
    pub fn success(&self, graduate: &Graduate) -> Announcement {
        let degree = self.degree_text(graduate.degree.as_deref());
        let faculty = self.faculty_text(&graduate.faculty);
        let text = [degree.as_str(), faculty.as_str(), graduate.fullname.trim()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        self.speak(text)
    }

    pub fn not_found(&self) -> Announcement {
        self.speak(self.not_found.clone())
    }

    pub fn already_checked_in(&self, graduate: &Graduate) -> Announcement {
        self.speak(self.already_checked_in.replace("{name}", graduate.fullname.trim()))
    }

    pub fn failure(&self) -> Announcement {
        self.speak(self.failure.clone())
    }

    /// Voice test phrase.
    pub fn ready(&self) -> Announcement {
        self.speak(self.ready.clone())
    }
}
