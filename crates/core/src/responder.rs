use crate::model::LessonId;

/// Produces the tutor's reply for a learner turn.
///
/// Implementations must be pure: the same lesson and turn always yield the
/// same text and nothing else is touched.
pub trait Responder: Send + Sync {
    fn respond(&self, lesson: LessonId, turn_index: usize) -> String;
}

const FALLBACK: &str = "I'm here to help you understand the quantum computing concepts in this \
lesson. Which aspect would you like to explore?";

/// Fixed lookup table keyed by lesson. Only the first three lessons have a
/// dedicated answer; the turn index does not change the reply.
#[derive(Debug, Clone, Copy, Default)]
pub struct CannedResponder;

impl Responder for CannedResponder {
    fn respond(&self, lesson: LessonId, _turn_index: usize) -> String {
        let text = match lesson.value() {
            1 => {
                "Quantum computing is a computing paradigm that uses quantum-mechanical \
                 phenomena such as superposition and entanglement to operate on data. Where \
                 classical computing uses bits (0 or 1), quantum computing uses qubits, which \
                 can exist in several states at once."
            }
            2 => {
                "Qubits are the fundamental unit of information in quantum computing. Unlike \
                 classical bits, qubits can be in superposition, existing as 0 and 1 at the \
                 same time with different probabilities until they are measured."
            }
            3 => {
                "Quantum entanglement is a phenomenon in which two or more qubits become \
                 correlated so that the state of each one cannot be described on its own. \
                 This enables kinds of information processing that are impossible on \
                 classical computers."
            }
            _ => FALLBACK,
        };
        text.to_string()
    }
}
