use super::{Float, Records};
use ndarray::{ArrayBase, Data, Ix2};
use sprs::{CsMatBase, SpIndex};
use std::ops::Deref;

/// Implement records for dense matrices
impl<F: Float, S: Data<Elem = F>> Records for ArrayBase<S, Ix2> {
    type Elem = F;

    fn nsamples(&self) -> usize {
        self.nrows()
    }

    fn nfeatures(&self) -> usize {
        self.ncols()
    }
}

/// Implement records for CSR/CSC matrices, owned or borrowed
impl<F, I, Iptr, IptrStorage, IndStorage, DataStorage> Records
    for CsMatBase<F, I, IptrStorage, IndStorage, DataStorage, Iptr>
where
    F: Float,
    I: SpIndex,
    Iptr: SpIndex,
    IptrStorage: Deref<Target = [Iptr]>,
    IndStorage: Deref<Target = [I]>,
    DataStorage: Deref<Target = [F]>,
{
    type Elem = F;

    fn nsamples(&self) -> usize {
        self.rows()
    }

    fn nfeatures(&self) -> usize {
        self.cols()
    }
}

/// Implement records for references
impl<R: Records> Records for &R {
    type Elem = R::Elem;

    fn nsamples(&self) -> usize {
        (*self).nsamples()
    }

    fn nfeatures(&self) -> usize {
        (*self).nfeatures()
    }
}
