// ledger/models.rs - Facility and child records plus request validation
//
// Field names on the wire and in the database keep the French column names
// (`nom`, `garderie_id`, ...) that existing clients already speak.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::error::LedgerError;

/// A daycare facility: a capacity-bounded pool of enrollment slots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Facility {
    #[serde(rename = "idgarderie")]
    #[sqlx(rename = "idgarderie")]
    pub id: i32,
    #[serde(rename = "nom")]
    #[sqlx(rename = "nom")]
    pub name: String,
    #[serde(rename = "adresse")]
    #[sqlx(rename = "adresse")]
    pub address: String,
    #[serde(rename = "tarif")]
    #[sqlx(rename = "tarif")]
    pub price: Decimal,
    #[serde(rename = "disponibilite")]
    #[sqlx(rename = "disponibilite")]
    pub available_slots: i32,
    #[serde(rename = "nombre_places")]
    #[sqlx(rename = "nombre_places")]
    pub total_capacity: i32,
    pub description: String,
    #[serde(rename = "directeur_id")]
    #[sqlx(rename = "directeur_id")]
    pub director_id: i32,
    pub photo: Option<String>,
}

/// A child enrollment record, optionally holding one facility slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Child {
    #[serde(rename = "idenfant")]
    #[sqlx(rename = "idenfant")]
    pub id: i32,
    #[serde(rename = "nom")]
    #[sqlx(rename = "nom")]
    pub name: String,
    pub age: i32,
    pub parent_id: Option<i32>,
    #[serde(rename = "garderie_id")]
    #[sqlx(rename = "garderie_id")]
    pub facility_id: Option<i32>,
}

/// Child row joined with the name and address of its facility, if any
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct ChildWithFacility {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub child: Child,
    pub garderie_nom: Option<String>,
    pub garderie_adresse: Option<String>,
}

/// Slot counters read under the facility row lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct SlotCount {
    #[sqlx(rename = "disponibilite")]
    pub available: i32,
    #[sqlx(rename = "nombre_places")]
    pub total: i32,
}

/// Validated child, ready to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChild {
    pub name: String,
    pub age: i32,
    pub parent_id: Option<i32>,
    pub facility_id: Option<i32>,
}

/// Validated facility, ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct NewFacility {
    pub name: String,
    pub address: String,
    pub price: Decimal,
    pub available_slots: i32,
    pub total_capacity: i32,
    pub description: String,
    pub director_id: i32,
    pub photo: Option<String>,
}

/// Name/age change; never carries a facility reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildUpdate {
    pub name: String,
    pub age: i32,
}

/// Descriptive facility fields; the slot counters are not part of it
#[derive(Debug, Clone, PartialEq)]
pub struct FacilityUpdate {
    pub name: String,
    pub address: String,
    pub price: Decimal,
    pub description: String,
}

/// Body of `POST /api/enfants`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnrollmentRequest {
    #[serde(default)]
    pub nom: Option<String>,
    #[serde(default)]
    pub age: Option<i32>,
    #[serde(default)]
    pub parent_id: Option<i32>,
    #[serde(default)]
    pub garderie_id: Option<i32>,
}

/// Body of `PUT /api/enfants/:id`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChildUpdateRequest {
    #[serde(default)]
    pub nom: Option<String>,
    #[serde(default)]
    pub age: Option<i32>,
}

/// Body of `POST /api/garderies`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FacilityRequest {
    #[serde(default)]
    pub nom: Option<String>,
    #[serde(default)]
    pub adresse: Option<String>,
    #[serde(default)]
    pub tarif: Option<Decimal>,
    #[serde(default)]
    pub disponibilite: Option<i32>,
    #[serde(default)]
    pub nombre_places: Option<i32>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub directeur_id: Option<i32>,
    #[serde(default)]
    pub photo: Option<String>,
}

/// Body of `PUT /api/garderies/:id`. `disponibilite` and `nombre_places`
/// are not accepted here; slots only move through the ledger.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FacilityUpdateRequest {
    #[serde(default)]
    pub nom: Option<String>,
    #[serde(default)]
    pub adresse: Option<String>,
    #[serde(default)]
    pub tarif: Option<Decimal>,
    #[serde(default)]
    pub description: Option<String>,
}

const CHILD_FIELDS_REQUIRED: &str = "Le nom et l'âge sont obligatoires";
const FACILITY_FIELDS_REQUIRED: &str = "Tous les champs sont obligatoires.";

fn present(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Zero ids count as absent, as existing clients send `0` for "none"
fn reference(id: Option<i32>) -> Option<i32> {
    id.filter(|&id| id != 0)
}

fn validate_name_and_age(nom: Option<String>, age: Option<i32>) -> Result<(String, i32), LedgerError> {
    let name = present(nom);
    // An age of 0 is treated as missing
    let age = age.filter(|&age| age != 0);
    let mut missing = Vec::new();
    if name.is_none() {
        missing.push("nom");
    }
    if age.is_none() {
        missing.push("age");
    }

    match (name, age) {
        (Some(name), Some(age)) => {
            if age < 0 {
                return Err(LedgerError::validation("L'âge doit être un nombre positif", vec!["age"]));
            }
            Ok((name, age))
        }
        _ => Err(LedgerError::validation(CHILD_FIELDS_REQUIRED, missing)),
    }
}

impl EnrollmentRequest {
    pub fn validate(self) -> Result<NewChild, LedgerError> {
        let (name, age) = validate_name_and_age(self.nom, self.age)?;
        Ok(NewChild {
            name,
            age,
            parent_id: reference(self.parent_id),
            facility_id: reference(self.garderie_id),
        })
    }
}

impl ChildUpdateRequest {
    pub fn validate(self) -> Result<ChildUpdate, LedgerError> {
        let (name, age) = validate_name_and_age(self.nom, self.age)?;
        Ok(ChildUpdate { name, age })
    }
}

impl FacilityRequest {
    /// Either counter may be omitted; a new facility defaults to fully available.
    pub fn validate(self) -> Result<NewFacility, LedgerError> {
        let name = present(self.nom);
        let address = present(self.adresse);
        let description = present(self.description);

        let mut missing = Vec::new();
        if name.is_none() {
            missing.push("nom");
        }
        if address.is_none() {
            missing.push("adresse");
        }
        if self.tarif.is_none() {
            missing.push("tarif");
        }
        if self.disponibilite.is_none() && self.nombre_places.is_none() {
            missing.push("disponibilite");
        }
        if description.is_none() {
            missing.push("description");
        }
        if self.directeur_id.is_none() {
            missing.push("directeur_id");
        }

        let (Some(name), Some(address), Some(price), Some(description), Some(director_id)) =
            (name, address, self.tarif, description, self.directeur_id)
        else {
            return Err(LedgerError::validation(FACILITY_FIELDS_REQUIRED, missing));
        };
        let Some(total_capacity) = self.nombre_places.or(self.disponibilite) else {
            return Err(LedgerError::validation(FACILITY_FIELDS_REQUIRED, missing));
        };
        let available_slots = self.disponibilite.unwrap_or(total_capacity);

        if price.is_sign_negative() {
            return Err(LedgerError::validation("Le tarif doit être positif", vec!["tarif"]));
        }
        if total_capacity < 0 || available_slots < 0 || available_slots > total_capacity {
            return Err(LedgerError::validation(
                "La disponibilité doit être comprise entre 0 et le nombre de places",
                vec!["disponibilite", "nombre_places"],
            ));
        }

        Ok(NewFacility {
            name,
            address,
            price,
            available_slots,
            total_capacity,
            description,
            director_id,
            photo: present(self.photo),
        })
    }
}

impl FacilityUpdateRequest {
    pub fn validate(self) -> Result<FacilityUpdate, LedgerError> {
        let name = present(self.nom);
        let address = present(self.adresse);
        let description = present(self.description);

        let mut missing = Vec::new();
        if name.is_none() {
            missing.push("nom");
        }
        if address.is_none() {
            missing.push("adresse");
        }
        if self.tarif.is_none() {
            missing.push("tarif");
        }
        if description.is_none() {
            missing.push("description");
        }

        let (Some(name), Some(address), Some(price), Some(description)) = (name, address, self.tarif, description) else {
            return Err(LedgerError::validation(FACILITY_FIELDS_REQUIRED, missing));
        };
        if price.is_sign_negative() {
            return Err(LedgerError::validation("Le tarif doit être positif", vec!["tarif"]));
        }

        Ok(FacilityUpdate { name, address, price, description })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn facility_request() -> FacilityRequest {
        FacilityRequest {
            nom: Some("Les Petits Loups".to_string()),
            adresse: Some("12 rue des Lilas".to_string()),
            tarif: Some(Decimal::new(4550, 2)),
            disponibilite: None,
            nombre_places: Some(5),
            description: Some("Garderie de quartier".to_string()),
            directeur_id: Some(7),
            photo: None,
        }
    }

    #[test]
    fn enrollment_requires_name_and_age() {
        let err = EnrollmentRequest { nom: Some("   ".into()), ..Default::default() }
            .validate()
            .unwrap_err();
        match err {
            LedgerError::Validation { message, fields } => {
                assert_eq!(message, CHILD_FIELDS_REQUIRED);
                assert_eq!(fields, vec!["nom", "age"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn enrollment_keeps_optional_references() {
        let child = EnrollmentRequest {
            nom: Some(" Léa ".into()),
            age: Some(3),
            parent_id: Some(4),
            garderie_id: Some(1),
        }
        .validate()
        .unwrap();
        assert_eq!(child.name, "Léa");
        assert_eq!(child.parent_id, Some(4));
        assert_eq!(child.facility_id, Some(1));
    }

    #[test]
    fn zero_age_counts_as_missing() {
        let err = EnrollmentRequest { nom: Some("Bébé".into()), age: Some(0), ..Default::default() }
            .validate()
            .unwrap_err();
        match err {
            LedgerError::Validation { message, fields } => {
                assert_eq!(message, CHILD_FIELDS_REQUIRED);
                assert_eq!(fields, vec!["age"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn zero_references_mean_none() {
        let child = EnrollmentRequest {
            nom: Some("Léa".into()),
            age: Some(3),
            parent_id: Some(0),
            garderie_id: Some(0),
        }
        .validate()
        .unwrap();
        assert_eq!(child.parent_id, None);
        assert_eq!(child.facility_id, None);
    }

    #[test]
    fn negative_age_is_rejected() {
        let err = ChildUpdateRequest { nom: Some("Tom".into()), age: Some(-1) }.validate().unwrap_err();
        assert!(matches!(err, LedgerError::Validation { .. }));
    }

    #[test]
    fn facility_defaults_to_fully_available() {
        let facility = facility_request().validate().unwrap();
        assert_eq!(facility.total_capacity, 5);
        assert_eq!(facility.available_slots, 5);
    }

    #[test]
    fn facility_total_defaults_to_availability() {
        let facility = FacilityRequest { disponibilite: Some(3), nombre_places: None, ..facility_request() }
            .validate()
            .unwrap();
        assert_eq!(facility.total_capacity, 3);
        assert_eq!(facility.available_slots, 3);
    }

    #[test]
    fn facility_availability_cannot_exceed_capacity() {
        let err = FacilityRequest { disponibilite: Some(6), ..facility_request() }.validate().unwrap_err();
        assert!(matches!(err, LedgerError::Validation { .. }));
    }

    #[test]
    fn facility_missing_fields_are_reported() {
        let err = FacilityRequest::default().validate().unwrap_err();
        match err {
            LedgerError::Validation { fields, .. } => {
                assert_eq!(fields, vec!["nom", "adresse", "tarif", "disponibilite", "description", "directeur_id"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn facility_update_requires_descriptive_fields() {
        let err = FacilityUpdateRequest { nom: Some("Soleil".into()), ..Default::default() }
            .validate()
            .unwrap_err();
        match err {
            LedgerError::Validation { fields, .. } => assert_eq!(fields, vec!["adresse", "tarif", "description"]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn facility_update_ignores_slot_counters() {
        let request: FacilityUpdateRequest = serde_json::from_value(json!({
            "nom": "Soleil",
            "adresse": "1 rue Haute",
            "tarif": 20,
            "description": "Rénovée",
            "disponibilite": 99
        }))
        .unwrap();
        let update = request.validate().unwrap();
        assert_eq!(update.name, "Soleil");
        assert_eq!(update.price, Decimal::new(20, 0));
    }

    #[test]
    fn joined_child_flattens_into_one_object() {
        let row = ChildWithFacility {
            child: Child { id: 2, name: "Tom".into(), age: 4, parent_id: Some(8), facility_id: Some(1) },
            garderie_nom: Some("Soleil".into()),
            garderie_adresse: Some("1 rue Haute".into()),
        };
        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["idenfant"], 2);
        assert_eq!(value["garderie_nom"], "Soleil");
        assert_eq!(value["garderie_adresse"], "1 rue Haute");
    }

    #[test]
    fn child_serializes_with_column_names() {
        let child = Child { id: 9, name: "Léa".into(), age: 3, parent_id: None, facility_id: Some(1) };
        assert_eq!(
            serde_json::to_value(&child).unwrap(),
            json!({ "idenfant": 9, "nom": "Léa", "age": 3, "parent_id": null, "garderie_id": 1 })
        );
    }
}
