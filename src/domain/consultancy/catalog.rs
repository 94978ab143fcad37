//! Visa service catalog

/// A consultation service offered by the office
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisaService {
    pub key: &'static str,
    pub name: &'static str,
    pub consultation_fee: &'static str,
    pub processing_time: &'static str,
    pub requirements: &'static [&'static str],
    pub description: &'static str,
}

pub const SERVICES: &[VisaService] = &[
    VisaService {
        key: "tourist",
        name: "Tourist Visa",
        consultation_fee: "$50",
        processing_time: "5-15 business days",
        requirements: &[
            "Valid passport (6+ months validity)",
            "Passport-size photographs",
            "Proof of accommodation",
            "Travel itinerary",
            "Bank statements (3 months)",
            "Travel insurance",
        ],
        description: "For leisure travel, visiting family, or short vacations abroad.",
    },
    VisaService {
        key: "student",
        name: "Student Visa",
        consultation_fee: "$75",
        processing_time: "2-8 weeks",
        requirements: &[
            "Acceptance letter from institution",
            "Proof of financial support",
            "Academic transcripts",
            "Language proficiency test scores",
            "Valid passport",
            "Medical examination",
        ],
        description: "For pursuing education abroad at universities, colleges, or language schools.",
    },
    VisaService {
        key: "work",
        name: "Work Visa",
        consultation_fee: "$100",
        processing_time: "4-12 weeks",
        requirements: &[
            "Job offer letter",
            "Employment contract",
            "Employer sponsorship documents",
            "Professional qualifications",
            "Work experience certificates",
            "Background check",
        ],
        description: "For employment opportunities in foreign countries.",
    },
    VisaService {
        key: "business",
        name: "Business Visa",
        consultation_fee: "$75",
        processing_time: "1-4 weeks",
        requirements: &[
            "Business invitation letter",
            "Company registration documents",
            "Purpose of visit letter",
            "Bank statements",
            "Previous travel history",
        ],
        description: "For business meetings, conferences, and professional engagements abroad.",
    },
    VisaService {
        key: "immigration",
        name: "Immigration Consulting",
        consultation_fee: "$150",
        processing_time: "Varies by program",
        requirements: &[
            "Varies by destination country",
            "Points-based assessment",
            "Language proficiency",
            "Work experience evaluation",
            "Educational credential assessment",
        ],
        description: "Guidance for permanent residency and citizenship applications.",
    },
];

/// Find a service by loose name, e.g. "tourist visa" or "Student"
pub fn find_service(query: &str) -> Option<&'static VisaService> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return None;
    }
    SERVICES
        .iter()
        .find(|s| query == s.key)
        .or_else(|| {
            SERVICES
                .iter()
                .find(|s| query.contains(s.key) || s.key.contains(query.as_str()))
        })
}

/// "Tourist Visa, Student Visa, ... and Immigration Consulting"
pub fn service_names() -> String {
    let names: Vec<&str> = SERVICES.iter().map(|s| s.name).collect();
    join_spoken(&names)
}

/// Join items the way they would be read aloud
pub fn join_spoken(items: &[&str]) -> String {
    match items {
        [] => String::new(),
        [only] => only.to_string(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}
