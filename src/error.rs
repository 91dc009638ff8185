// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::fmt;

/// Errors raised while building, decoding, or querying a tau-p model.
///
/// Numerical shortfalls (a quadrature or root search running out of
/// iterations) are never reported here; they are logged and the best
/// estimate is used. Only structural problems surface as errors.
#[derive(Debug)]
pub enum TauPError {
    /// Layer radii are not finite, negative, or inverted (top below bottom).
    InvalidLayerRadii {
        /// The top radius provided.
        top: f64,
        /// The bottom radius provided.
        bottom: f64,
    },
    /// A new layer does not start where the previous layer ends.
    NonContiguousLayer {
        /// Index the layer would have occupied.
        index: usize,
        /// Top radius of the new layer.
        top: f64,
        /// Bottom radius of the previous layer.
        previous_bottom: f64,
    },
    /// Velocity is not positive and finite somewhere on a layer boundary.
    InvalidVelocity {
        /// The radius where the velocity was evaluated.
        radius: f64,
        /// The invalid velocity value.
        value: f64,
    },
    /// Solver or integrator tolerance is not positive and finite.
    InvalidTolerance(f64),
    /// Finite-difference step is not positive and finite.
    InvalidDerivativeStep(f64),
    /// Planet radius is not positive and finite.
    InvalidPlanetRadius(f64),
    /// The model holds no layers.
    EmptyModel,
    /// A query distance or depth cannot be evaluated.
    InvalidQuery {
        /// The epicentral distance in radians.
        distance: f64,
        /// The source depth in km.
        depth: f64,
    },
    /// A layer index is beyond the end of the stack.
    LayerIndexOutOfRange {
        /// The index requested.
        index: usize,
        /// Number of layers in the model.
        len: usize,
    },
    /// A read ran past the end of a byte buffer.
    TruncatedBuffer {
        /// Cursor position at the start of the read.
        position: usize,
        /// Bytes the read required.
        needed: usize,
        /// Total buffer length.
        len: usize,
    },
    /// The layer record names a velocity law this crate does not know.
    UnknownVelocityLaw(String),
    /// Stored and recomputed MD5 digests differ.
    ChecksumMismatch {
        /// The digest stored in the buffer.
        stored: String,
        /// The digest recomputed from the buffer contents.
        computed: String,
    },
    /// A length-prefixed string is not valid UTF-8 or has a negative length.
    InvalidString {
        /// Cursor position of the string's length prefix.
        position: usize,
    },
    /// The buffer does not start with a recognised model header.
    InvalidHeader(String),
    /// I/O error occurred.
    IoError(std::io::Error),
    /// Other error with a descriptive message.
    Other(String),
}

impl fmt::Display for TauPError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TauPError::InvalidLayerRadii { top, bottom } => {
                write!(
                    f,
                    "invalid layer radii: top {} km, bottom {} km (need top >= bottom >= 0)",
                    top, bottom
                )
            }
            TauPError::NonContiguousLayer {
                index,
                top,
                previous_bottom,
            } => {
                write!(
                    f,
                    "layer {} top radius {} km does not equal previous layer bottom radius {} km",
                    index, top, previous_bottom
                )
            }
            TauPError::InvalidVelocity { radius, value } => {
                write!(
                    f,
                    "invalid velocity at radius {} km: {} (must be positive and finite)",
                    radius, value
                )
            }
            TauPError::InvalidTolerance(tol) => {
                write!(
                    f,
                    "invalid tolerance: {} (must be positive and finite)",
                    tol
                )
            }
            TauPError::InvalidDerivativeStep(step) => {
                write!(
                    f,
                    "invalid derivative step: {} (must be positive and finite)",
                    step
                )
            }
            TauPError::InvalidPlanetRadius(r) => {
                write!(
                    f,
                    "invalid planet radius: {} (must be positive and finite)",
                    r
                )
            }
            TauPError::EmptyModel => write!(f, "velocity model has no layers"),
            TauPError::InvalidQuery { distance, depth } => {
                write!(
                    f,
                    "invalid query: distance {} rad, depth {} km",
                    distance, depth
                )
            }
            TauPError::LayerIndexOutOfRange { index, len } => {
                write!(f, "layer index {} out of range for {} layers", index, len)
            }
            TauPError::TruncatedBuffer {
                position,
                needed,
                len,
            } => {
                write!(
                    f,
                    "truncated buffer: need {} bytes at position {} but length is {}",
                    needed, position, len
                )
            }
            TauPError::UnknownVelocityLaw(name) => {
                write!(f, "unknown velocity law: '{}'", name)
            }
            TauPError::ChecksumMismatch { stored, computed } => {
                write!(
                    f,
                    "checksum mismatch: stored {}, computed {}",
                    stored, computed
                )
            }
            TauPError::InvalidString { position } => {
                write!(f, "invalid string at buffer position {}", position)
            }
            TauPError::InvalidHeader(found) => {
                write!(f, "invalid model header: found '{}'", found)
            }
            TauPError::IoError(e) => write!(f, "I/O error: {}", e),
            TauPError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for TauPError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TauPError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TauPError {
    fn from(e: std::io::Error) -> Self {
        TauPError::IoError(e)
    }
}

/// Convenience type alias for Results with TauPError.
pub type Result<T> = std::result::Result<T, TauPError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_invalid_layer_radii() {
        let e = TauPError::InvalidLayerRadii {
            top: 6300.0,
            bottom: 6371.0,
        };
        assert_eq!(
            e.to_string(),
            "invalid layer radii: top 6300 km, bottom 6371 km (need top >= bottom >= 0)"
        );
    }

    #[test]
    fn display_non_contiguous_layer() {
        let e = TauPError::NonContiguousLayer {
            index: 2,
            top: 6300.0,
            previous_bottom: 6336.0,
        };
        assert_eq!(
            e.to_string(),
            "layer 2 top radius 6300 km does not equal previous layer bottom radius 6336 km"
        );
    }

    #[test]
    fn display_invalid_velocity() {
        let e = TauPError::InvalidVelocity {
            radius: 6371.0,
            value: -1.0,
        };
        assert_eq!(
            e.to_string(),
            "invalid velocity at radius 6371 km: -1 (must be positive and finite)"
        );
    }

    #[test]
    fn display_invalid_tolerance() {
        let e = TauPError::InvalidTolerance(0.0);
        assert_eq!(
            e.to_string(),
            "invalid tolerance: 0 (must be positive and finite)"
        );
    }

    #[test]
    fn display_truncated_buffer() {
        let e = TauPError::TruncatedBuffer {
            position: 40,
            needed: 8,
            len: 44,
        };
        assert_eq!(
            e.to_string(),
            "truncated buffer: need 8 bytes at position 40 but length is 44"
        );
    }

    #[test]
    fn display_checksum_mismatch() {
        let e = TauPError::ChecksumMismatch {
            stored: "aa".to_string(),
            computed: "bb".to_string(),
        };
        assert_eq!(e.to_string(), "checksum mismatch: stored aa, computed bb");
    }

    #[test]
    fn display_unknown_velocity_law() {
        let e = TauPError::UnknownVelocityLaw("Spline".to_string());
        assert_eq!(e.to_string(), "unknown velocity law: 'Spline'");
    }

    #[test]
    fn display_empty_model() {
        assert_eq!(TauPError::EmptyModel.to_string(), "velocity model has no layers");
    }

    #[test]
    fn display_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let e = TauPError::IoError(io_err);
        assert!(e.to_string().contains("I/O error"));
        assert!(e.to_string().contains("file not found"));
    }

    #[test]
    fn display_other() {
        let e = TauPError::Other("something went wrong".to_string());
        assert_eq!(e.to_string(), "something went wrong");
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let e: TauPError = io_err.into();
        assert!(matches!(e, TauPError::IoError(_)));
    }

    #[test]
    fn error_source() {
        use std::error::Error;

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let e = TauPError::IoError(io_err);
        assert!(e.source().is_some());

        let e2 = TauPError::Other("msg".to_string());
        assert!(e2.source().is_none());
    }
}
