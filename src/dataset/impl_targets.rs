use ndarray::{ArrayBase, ArrayView1, Data, Ix1};

/// Single-target access
///
/// All models in this workspace are single-output; this trait gives them a
/// uniform read-only view over whatever the caller stores targets in.
pub trait AsSingleTargets {
    type Elem;

    fn as_single_targets(&self) -> ArrayView1<'_, Self::Elem>;
}

impl<L, S: Data<Elem = L>> AsSingleTargets for ArrayBase<S, Ix1> {
    type Elem = L;

    fn as_single_targets(&self) -> ArrayView1<'_, L> {
        self.view()
    }
}
