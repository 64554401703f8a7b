//! Built-in data used when nothing is persisted yet, and as the stand-in tips
//! source when no tips endpoint is configured.

use chrono::{DateTime, Utc};

use crate::models::{
    Coordinates, PickupRecord, PickupStatus, Priority, TipCategory, TipEntry, TipPriority,
};

/// Suggested questions offered in an empty chat.
pub const CHAT_STARTERS: [&str; 8] = [
    "How should I handle a blood sample that's been at room temperature?",
    "What's the proper procedure for collecting urine samples?",
    "My temperature monitor is showing an error. What should I do?",
    "How do I properly dispose of contaminated materials?",
    "What are the storage requirements for tissue samples?",
    "Can you explain the chain of custody process?",
    "What PPE should I wear for different sample types?",
    "How long can samples be stored before transport?",
];

#[allow(clippy::too_many_arguments)]
fn pickup(
    id: &str,
    facility: &str,
    address: &str,
    (lat, lng): (f64, f64),
    time: &str,
    sample_type: &str,
    priority: Priority,
    contact: &str,
    phone: &str,
    requirements: &[&str],
    estimated_duration: u32,
) -> PickupRecord {
    PickupRecord {
        id: id.to_string(),
        facility: facility.to_string(),
        address: address.to_string(),
        coordinates: Some(Coordinates { lat, lng }),
        scheduled_time: time.to_string(),
        sample_type: sample_type.to_string(),
        priority,
        status: PickupStatus::Pending,
        contact: Some(contact.to_string()),
        phone: Some(phone.to_string()),
        requirements: requirements.iter().map(|r| r.to_string()).collect(),
        estimated_duration,
        collected_at: None,
        in_transit_at: None,
        delivered_at: None,
        cancelled_at: None,
    }
}

fn at(now: DateTime<Utc>, hour: u32, minute: u32) -> Option<DateTime<Utc>> {
    now.date_naive()
        .and_hms_opt(hour, minute, 0)
        .map(|naive| naive.and_utc())
}

/// Today's route: five pickups, three pending and two already collected.
pub fn pickups(now: DateTime<Utc>) -> Vec<PickupRecord> {
    let mut sm003 = pickup(
        "SM003",
        "Community Health Center",
        "789 Care Street, Uptown",
        (40.7831, -73.9712),
        "11:45 AM",
        "Tissue Sample",
        Priority::Urgent,
        "Dr. Michael Chen",
        "+1-555-0103",
        &["Frozen transport", "STAT processing"],
        45,
    );
    sm003.status = PickupStatus::Collected;
    sm003.collected_at = at(now, 11, 45);

    let mut sm005 = pickup(
        "SM005",
        "Suburban Family Practice",
        "654 Family Drive, Westside",
        (40.7282, -74.0776),
        "02:30 PM",
        "Blood Sample",
        Priority::Low,
        "Nurse Practitioner John Davis",
        "+1-555-0105",
        &["Standard venipuncture", "Multiple tubes"],
        25,
    );
    sm005.status = PickupStatus::Collected;
    sm005.collected_at = at(now, 14, 25);

    vec![
        pickup(
            "SM001",
            "City General Hospital",
            "123 Medical Center Dr, Downtown",
            (40.7128, -74.0060),
            "09:00 AM",
            "Blood Sample",
            Priority::High,
            "Dr. Sarah Johnson",
            "+1-555-0101",
            &["Temperature controlled", "Priority delivery", "Chain of custody"],
            30,
        ),
        pickup(
            "SM002",
            "Regional Medical Clinic",
            "456 Health Avenue, Midtown",
            (40.7589, -73.9851),
            "10:30 AM",
            "Urine Sample",
            Priority::Medium,
            "Nurse Maria Garcia",
            "+1-555-0102",
            &["Standard handling", "Room temperature"],
            15,
        ),
        sm003,
        pickup(
            "SM004",
            "Metropolitan Hospital",
            "321 Wellness Boulevard, Eastside",
            (40.7505, -73.9934),
            "01:15 PM",
            "Swab Sample",
            Priority::High,
            "Lab Technician Amy Liu",
            "+1-555-0104",
            &["Sterile collection", "Viral transport medium"],
            20,
        ),
        sm005,
    ]
}

fn tip(
    id: u32,
    title: &str,
    body: &str,
    category: TipCategory,
    icon: &str,
    priority: TipPriority,
    tags: &[&str],
) -> TipEntry {
    TipEntry {
        id,
        title: title.to_string(),
        body: body.to_string(),
        category,
        icon: icon.to_string(),
        priority,
        tags: tags.iter().map(|t| t.to_string()).collect(),
    }
}

pub fn tips() -> Vec<TipEntry> {
    vec![
        tip(
            1,
            "Proper Hand Hygiene",
            "Always wash your hands for at least 20 seconds with soap and warm water before and after each sample collection. Use alcohol-based hand sanitizer when soap is unavailable.",
            TipCategory::Safety,
            "🧼",
            TipPriority::High,
            &["hygiene", "infection-control", "safety"],
        ),
        tip(
            2,
            "Temperature Control",
            "Blood samples must be kept between 2-8°C during transport. Use insulated containers with ice packs and monitor temperature regularly. Document any temperature excursions.",
            TipCategory::Handling,
            "🌡️",
            TipPriority::Critical,
            &["temperature", "transport", "blood"],
        ),
        tip(
            3,
            "Sample Labeling Best Practices",
            "Label samples immediately after collection. Include patient ID, collection date/time, sample type, and your initials. Verify with two patient identifiers.",
            TipCategory::Quality,
            "🏷️",
            TipPriority::Critical,
            &["labeling", "identification", "quality"],
        ),
        tip(
            4,
            "Personal Protective Equipment",
            "Always wear appropriate PPE including gloves, safety glasses, and lab coat. Change gloves between patients and dispose of contaminated materials properly.",
            TipCategory::Safety,
            "🥽",
            TipPriority::High,
            &["ppe", "protection", "contamination"],
        ),
        tip(
            5,
            "Chain of Custody",
            "Maintain proper chain of custody documentation. Record who collected, transported, and received each sample. Keep samples secure and supervised at all times.",
            TipCategory::Quality,
            "📋",
            TipPriority::High,
            &["documentation", "custody", "security"],
        ),
        tip(
            6,
            "Specimen Transport Timing",
            "Transport specimens to the laboratory within 2 hours of collection when possible. For longer transport times, follow specific storage requirements.",
            TipCategory::Transport,
            "⏰",
            TipPriority::Medium,
            &["timing", "transport", "storage"],
        ),
        tip(
            7,
            "Contamination Prevention",
            "Use sterile collection techniques and avoid touching the inside of collection containers. Keep specimens covered and separated to prevent cross-contamination.",
            TipCategory::Handling,
            "🛡️",
            TipPriority::Critical,
            &["sterile", "contamination", "technique"],
        ),
        tip(
            8,
            "Equipment Maintenance",
            "Regularly clean and calibrate temperature monitoring devices. Check expiration dates on collection supplies and replace as needed.",
            TipCategory::Maintenance,
            "🔧",
            TipPriority::Medium,
            &["equipment", "maintenance", "calibration"],
        ),
    ]
}
