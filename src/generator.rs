//! Synthetic field generation for contact and company payloads.
//!
//! Produces the JSON item maps consumed by the remote's batch-import call.
//! Field values are assembled from small word lists; uniqueness is not a
//! goal, plausibility is.

use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Value};

const FIRST_NAMES: &[&str] = &[
    "Anna", "Boris", "Clara", "Dmitri", "Elena", "Felix", "Greta", "Henrik", "Irina", "Jonas",
    "Katya", "Lukas", "Marta", "Nikolai", "Olga", "Pavel", "Rosa", "Stefan", "Tamara", "Viktor",
];

const LAST_NAMES: &[&str] = &[
    "Adler", "Bergmann", "Castellano", "Dvorak", "Eriksen", "Fischer", "Gruber", "Hoffman",
    "Ivanov", "Jansen", "Kowalski", "Lindqvist", "Moreau", "Novak", "Olsen", "Petrov",
    "Richter", "Sokolov", "Tanaka", "Weber",
];

const COMPANY_STEMS: &[&str] = &[
    "Aurora", "Borealis", "Cobalt", "Delta", "Everest", "Fulcrum", "Granite", "Horizon",
    "Ionis", "Juniper", "Keystone", "Lumen", "Meridian", "Northwind", "Obsidian", "Pinnacle",
    "Quanta", "Redwood", "Summit", "Vertex",
];

const COMPANY_SUFFIXES: &[&str] = &[
    "Systems", "Logistics", "Holdings", "Partners", "Dynamics", "Industries", "Consulting",
    "Labs", "Group", "Trading",
];

const JOB_TITLES: &[&str] = &[
    "Account Manager", "Sales Director", "Operations Lead", "Project Manager",
    "Business Analyst", "Support Engineer", "Marketing Specialist", "Procurement Officer",
    "Finance Controller", "Logistics Coordinator",
];

fn phone_number<R: Rng>(rng: &mut R) -> String {
    format!(
        "+1 {:03} {:03} {:04}",
        rng.gen_range(200..1000),
        rng.gen_range(100..1000),
        rng.gen_range(0..10000)
    )
}

fn multi_field(value: String) -> Value {
    json!([{ "VALUE": value, "VALUE_TYPE": "WORK" }])
}

/// Build one contact item for the batch-import payload.
pub fn contact_payload<R: Rng>(rng: &mut R) -> Value {
    let name = *FIRST_NAMES.choose(rng).expect("non-empty list");
    let last_name = *LAST_NAMES.choose(rng).expect("non-empty list");
    let email = format!(
        "{}.{}{}@example.com",
        name.to_lowercase(),
        last_name.to_lowercase(),
        rng.gen_range(1..1000)
    );
    json!({
        "NAME": name,
        "LAST_NAME": last_name,
        "PHONE": multi_field(phone_number(rng)),
        "EMAIL": multi_field(email),
        "POST": *JOB_TITLES.choose(rng).expect("non-empty list"),
    })
}

/// Build one company item for the batch-import payload.
pub fn company_payload<R: Rng>(rng: &mut R) -> Value {
    let stem = *COMPANY_STEMS.choose(rng).expect("non-empty list");
    let suffix = *COMPANY_SUFFIXES.choose(rng).expect("non-empty list");
    let email = format!("office@{}-{}.example.com", stem.to_lowercase(), suffix.to_lowercase());
    json!({
        "TITLE": format!("{} {}", stem, suffix),
        "PHONE": multi_field(phone_number(rng)),
        "EMAIL": multi_field(email),
    })
}

/// Build `count` payloads of the given shape.
pub fn batch_payloads<R: Rng>(rng: &mut R, count: usize, build: fn(&mut R) -> Value) -> Vec<Value> {
    (0..count).map(|_| build(rng)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_payload_fields() {
        let mut rng = rand::thread_rng();
        let payload = contact_payload(&mut rng);
        assert!(payload["NAME"].is_string());
        assert!(payload["LAST_NAME"].is_string());
        assert!(payload["POST"].is_string());
        assert_eq!(payload["PHONE"][0]["VALUE_TYPE"], "WORK");
        assert!(payload["EMAIL"][0]["VALUE"]
            .as_str()
            .unwrap()
            .contains('@'));
    }

    #[test]
    fn test_company_payload_fields() {
        let mut rng = rand::thread_rng();
        let payload = company_payload(&mut rng);
        assert!(payload["TITLE"].as_str().unwrap().contains(' '));
        assert!(payload["PHONE"][0]["VALUE"].is_string());
        assert!(payload.get("NAME").is_none());
    }

    #[test]
    fn test_batch_payloads_count() {
        let mut rng = rand::thread_rng();
        assert_eq!(batch_payloads(&mut rng, 5, contact_payload).len(), 5);
        assert!(batch_payloads(&mut rng, 0, company_payload).is_empty());
    }
}
