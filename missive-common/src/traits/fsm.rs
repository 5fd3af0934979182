/// A state machine whose transitions may be refused.
///
/// Implementors must keep `transition` free of side effects so the same
/// `(state, input)` pair always yields the same result.
pub trait FiniteStateMachine: Sized {
    type Input;
    type Error;

    /// Attempt to move to the next state.
    ///
    /// # Errors
    ///
    /// Returns `Self::Error` if `input` is not legal in the current state.
    fn transition(self, input: Self::Input) -> Result<Self, Self::Error>;
}
