//! Telescoping of two consecutive restriction steps into one.

use crate::mesh_error::AgglomError;
use crate::topology::{FaceRestrict, RestrictionMap};

/// Face restriction of two steps in one.
///
/// `prev` maps level L-1 faces onto level L; `cur` maps level L faces onto
/// level L+1, with `cur_restrict` the level L cell restriction. A face that
/// survives both steps keeps its orientation relative to the final face, so
/// its flip is the parity of the two flips. Collapsed faces carry no flip.
pub fn compose_face_restrict(
    prev: &[FaceRestrict],
    prev_flip: &[bool],
    cur: &[FaceRestrict],
    cur_flip: &[bool],
    cur_restrict: &RestrictionMap,
) -> Result<(Vec<FaceRestrict>, Vec<bool>), AgglomError> {
    if prev.len() != prev_flip.len() {
        return Err(AgglomError::SizeMismatch {
            expected: prev.len(),
            found: prev_flip.len(),
        });
    }
    if cur.len() != cur_flip.len() {
        return Err(AgglomError::SizeMismatch {
            expected: cur.len(),
            found: cur_flip.len(),
        });
    }
    prev.iter()
        .zip(prev_flip)
        .map(|(&fr, &flip)| match fr {
            FaceRestrict::Coarse(e) => match cur.get(e) {
                Some(&FaceRestrict::Coarse(g)) => Ok((FaceRestrict::Coarse(g), flip ^ cur_flip[e])),
                Some(&collapsed) => Ok((collapsed, false)),
                None => Err(AgglomError::OutOfBoundsAddressing {
                    max: e,
                    size: cur.len(),
                }),
            },
            FaceRestrict::Collapsed(c) => {
                if c >= cur_restrict.len() {
                    return Err(AgglomError::OutOfBoundsAddressing {
                        max: c,
                        size: cur_restrict.len(),
                    });
                }
                Ok((FaceRestrict::Collapsed(cur_restrict.get(c)), false))
            }
        })
        .collect::<Result<Vec<_>, _>>()
        .map(|v| v.into_iter().unzip())
}
