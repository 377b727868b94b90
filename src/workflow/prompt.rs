//! The instruction sent alongside the recording.

/// Section headings the model is asked to produce, in order.
pub const SECTION_LABELS: [&str; 4] = [
    "Basic Information",
    "Executive Summary",
    "Detailed Discussion Items",
    "Action Items",
];

/// Build the four-part meeting-minutes instruction.
///
/// The generated document is returned verbatim; nothing checks that the model
/// actually followed this structure.
pub fn build_prompt(language: &str) -> String {
    let sections: String = SECTION_LABELS
        .iter()
        .enumerate()
        .map(|(i, label)| format!("{}. {}\n", i + 1, label))
        .collect();

    format!(
        "You are a professional secretary. Based on the attached recording, \
         write the meeting minutes in {language} with exactly these sections:\n\
         {sections}\
         Under {action} list each task with its owner and due date when they are mentioned.",
        language = language,
        sections = sections,
        action = SECTION_LABELS[3],
    )
}
