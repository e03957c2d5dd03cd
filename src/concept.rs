use crate::db::DbClient;
use crate::error::BunnyResult;
use crate::protocol::Group;
use std::collections::HashMap;

/// Maps concept id (as its string form, matching the wire representation)
/// to domain id (`"Condition"`, `"Drug"`, `"Gender"`, ...).
pub type ConceptDomainMap = HashMap<String, String>;

/// Resolves every concept referenced across `groups` to its current domain.
/// Looking this up fresh rather than trusting any payload-supplied domain
/// guards against a concept having moved domains between vocabulary
/// versions.
pub async fn map_concepts_to_domains(
    db: &dyn DbClient,
    groups: &[Group],
) -> BunnyResult<ConceptDomainMap> {
    let concept_ids: Vec<String> = {
        let mut seen = std::collections::HashSet::new();
        for group in groups {
            for rule in &group.rules {
                if let Some(id) = rule.concept_id() {
                    seen.insert(id);
                }
            }
        }
        seen.into_iter().map(|id| id.to_string()).collect()
    };

    if concept_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let in_clause = concept_ids.join(", ");
    let statement = format!(
        "SELECT DISTINCT concept_id, domain_id FROM concept WHERE concept_id IN ({in_clause})"
    );

    let rows = db.execute_and_fetch(&statement).await?;
    let mut map = HashMap::new();
    for row in rows {
        let (Some(concept_id), Some(domain_id)) = (row.get("concept_id"), row.get("domain_id"))
        else {
            continue;
        };
        let concept_id = concept_id
            .as_i64()
            .map(|v| v.to_string())
            .unwrap_or_else(|| concept_id.to_string());
        let domain_id = domain_id.as_str().unwrap_or_default().to_string();
        map.insert(concept_id, domain_id);
    }
    Ok(map)
}
