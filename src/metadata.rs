#[cfg(test)]
use base64::Engine;
use crate::protocol::File;

/// Builds the `metadata.bcos` artifact describing the collection's
/// rounding/suppression policy and OMOP data model, the way
/// `MetadataService.generate_metadata` does. Not wired into the default
/// result path — callers opt in explicitly, matching the source, where this
/// service exists but is never invoked from `execute_query`.
pub fn generate_metadata(collection_id: &str, bunny_version: &str, encode: bool) -> File {
    let header = "BIOBANK\tPROTOCOL\tOS\tBCLINK\tDATAMODEL\tROUNDING\tTHRESHOLD";
    // Rounding/threshold are hardcoded to zero pending a decision on
    // whether obfuscation parameters should ever be disclosed to Relay.
    let data_line = format!("{collection_id}\tBunny\t\t{bunny_version}\tOMOP\t0\t0");
    let metadata = format!("{header}\n{data_line}");

    let mut file = if encode {
        File::from_tsv("metadata.bcos", &metadata)
    } else {
        File::from_tsv_unencoded("metadata.bcos", &metadata)
    };
    file.description = "Metadata for the result of code.distribution analysis".to_string();
    file.sensitive = false;
    file
}
