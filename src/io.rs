// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::io::Write;
use std::path::Path;

use log::debug;
use ndarray::Array2;

use crate::codec::{ByteOrder, DataBuffer};
use crate::error::{Result, TauPError};
use crate::limits::{CriticalPoint, LayerClass, LayerLimits};
use crate::model::VelocityModel;
use crate::root_finder::ExtremumKind;
use crate::velocity::{PhaseNames, VelocityLaw, VelocityLayer};

const MAGIC: &str = "TauPModel";
const FORMAT_VERSION: i32 = 1;
const LAW_TAGS: [&str; 5] = ["Constant", "Power", "Linear", "Quadratic", "Cubic"];

/// Smallest encoded layer: three length prefixes, the shortest law tag, five
/// presence flags, the class code, three flags, 15 doubles and one
/// coefficient.
const MIN_LAYER_BYTES: usize = 3 * 4 + 5 + 5 + 4 + 3 + 15 * 8 + 8;

/// Serialize `model` into a checksummed byte buffer.
///
/// The cached classification is included when the model has one.
pub fn encode_model(model: &VelocityModel, order: ByteOrder, aligned: bool) -> Result<Vec<u8>> {
    let mut buf = DataBuffer::new();
    buf.reserve_digest();
    buf.put_u8(order.marker());
    buf.put_bool(aligned);
    buf.set_byte_order(order);
    buf.set_aligned(aligned);

    buf.put_string(MAGIC);
    buf.put_i32(FORMAT_VERSION);
    buf.put_string(model.name());
    buf.put_string(model.phase_type());
    buf.put_f64(model.planet_radius());
    buf.put_i32(i32::try_from(model.len()).map_err(|_| TauPError::Other("too many layers".into()))?);
    let classified = model.is_classified();
    buf.put_bool(classified);

    for (i, layer) in model.layers().iter().enumerate() {
        let limits = if classified { model.limits(i) } else { None };
        write_layer(&mut buf, layer, limits);
    }

    buf.seal()?;
    debug!("encoded model '{}': {} bytes", model.name(), buf.len());
    Ok(buf.into_bytes())
}

fn write_layer(buf: &mut DataBuffer, layer: &VelocityLayer, limits: Option<&LayerLimits>) {
    let law = layer.law();
    buf.put_string(law.name());
    buf.put_string(layer.name());
    buf.put_string(layer.phase_type());
    let names = layer.phase_names();
    for name in [
        &names.primary,
        &names.upper,
        &names.lower,
        &names.diffracted_upper,
        &names.diffracted_lower,
    ] {
        buf.put_optional_string(name.as_deref());
    }

    let critical = limits.and_then(|l| l.critical);
    buf.put_i32(limits.map_or(-1, |l| l.class.code()));
    buf.put_bool(critical.is_some());
    buf.put_bool(names.diffracted_upper.is_some());
    buf.put_bool(names.diffracted_lower.is_some());

    let (p_min, distance_top, distance_bottom, slope_top, slope_bottom) = limits.map_or(
        (0.0, 0.0, 0.0, 0.0, 0.0),
        |l| (l.p_min, l.distance_top, l.distance_bottom, l.slope_top, l.slope_bottom),
    );
    let (r_turn, v_turn, p_crit, d_crit) = critical.map_or((-1.0, -1.0, 0.0, 0.0), |c| {
        (c.radius, c.velocity, c.p, c.distance)
    });
    for v in [
        layer.r_top(),
        layer.r_bottom(),
        layer.v_top(),
        layer.v_bottom(),
        layer.p_top(),
        layer.p_bottom(),
        r_turn,
        v_turn,
        distance_top,
        distance_bottom,
        slope_top,
        slope_bottom,
        p_min,
        p_crit,
        d_crit,
    ] {
        buf.put_f64(v);
    }

    match *law {
        VelocityLaw::Constant { velocity } => buf.put_f64(velocity),
        VelocityLaw::Power {
            v_top,
            v_bottom,
            exponent,
        } => {
            for v in [v_top, v_bottom, exponent, 1.0 - exponent] {
                buf.put_f64(v);
            }
        }
        VelocityLaw::Linear { a0, a1, norm_radius } => {
            for v in [norm_radius, a0, a1] {
                buf.put_f64(v);
            }
        }
        VelocityLaw::Quadratic {
            a0,
            a1,
            a2,
            norm_radius,
        } => {
            for v in [norm_radius, a0, a1, a2] {
                buf.put_f64(v);
            }
        }
        VelocityLaw::Cubic {
            a0,
            a1,
            a2,
            a3,
            norm_radius,
        } => {
            for v in [norm_radius, a0, a1, a2, a3] {
                buf.put_f64(v);
            }
        }
    }
}

/// Rebuild a model from bytes written by [`encode_model`].
///
/// # Errors
/// Fails on a digest mismatch, a bad header, truncation, an unknown law
/// tag, or layers that do not stack contiguously.
pub fn decode_model(bytes: &[u8]) -> Result<VelocityModel> {
    let mut buf = DataBuffer::from_bytes(bytes.to_vec());
    buf.verify()?;
    buf.seek(crate::codec::DIGEST_LEN);

    let marker = buf.get_u8()?;
    let order = ByteOrder::from_marker(marker)
        .ok_or_else(|| TauPError::InvalidHeader(format!("byte order marker {}", marker)))?;
    let aligned = buf.get_bool()?;
    buf.set_byte_order(order);
    buf.set_aligned(aligned);

    let magic = buf.get_string()?;
    if magic != MAGIC {
        return Err(TauPError::InvalidHeader(format!("magic '{}'", magic)));
    }
    let version = buf.get_i32()?;
    if version != FORMAT_VERSION {
        return Err(TauPError::InvalidHeader(format!("format version {}", version)));
    }

    let name = buf.get_string()?;
    let phase_type = buf.get_string()?;
    let radius = buf.get_f64()?;
    let mut model = VelocityModel::new(name)
        .with_planet_radius(radius)?
        .with_phase_type(phase_type);
    let count = buf.get_i32()?;
    let count = usize::try_from(count)
        .map_err(|_| TauPError::InvalidHeader(format!("layer count {}", count)))?;
    let classified = buf.get_bool()?;
    if count > buf.remaining() / MIN_LAYER_BYTES {
        return Err(TauPError::InvalidHeader(format!(
            "layer count {} exceeds the {} bytes left",
            count,
            buf.remaining()
        )));
    }

    let mut limits = Vec::with_capacity(count);
    for _ in 0..count {
        let (layer, lim) = read_layer(&mut buf)?;
        model.push_layer(layer)?;
        limits.push(lim);
    }

    if classified {
        let restored = limits
            .into_iter()
            .enumerate()
            .map(|(i, l)| l.ok_or_else(|| TauPError::InvalidHeader(format!("layer {} has no class", i))))
            .collect::<Result<Vec<_>>>()?;
        model.restore_limits(restored);
    }
    debug!("decoded model '{}' with {} layers", model.name(), model.len());
    Ok(model)
}

fn read_layer(buf: &mut DataBuffer) -> Result<(VelocityLayer, Option<LayerLimits>)> {
    let tag = buf.get_string()?;
    if !LAW_TAGS.contains(&tag.as_str()) {
        return Err(TauPError::UnknownVelocityLaw(tag));
    }
    let name = buf.get_string()?;
    let phase_type = buf.get_string()?;
    let mut names = PhaseNames {
        primary: buf.get_optional_string()?,
        upper: buf.get_optional_string()?,
        lower: buf.get_optional_string()?,
        diffracted_upper: buf.get_optional_string()?,
        diffracted_lower: buf.get_optional_string()?,
    };
    let code = buf.get_i32()?;
    let retrograde = buf.get_bool()?;
    if buf.get_bool()? && names.diffracted_upper.is_none() {
        names.diffracted_upper = Some(String::new());
    }
    if buf.get_bool()? && names.diffracted_lower.is_none() {
        names.diffracted_lower = Some(String::new());
    }

    let mut d = [0.0; 15];
    for v in &mut d {
        *v = buf.get_f64()?;
    }
    let [r_top, r_bottom, _, _, _, _, r_turn, v_turn, distance_top, distance_bottom, slope_top, slope_bottom, p_min, p_crit, d_crit] =
        d;

    let law = match tag.as_str() {
        "Constant" => VelocityLaw::Constant {
            velocity: buf.get_f64()?,
        },
        "Power" => {
            let law = VelocityLaw::Power {
                v_top: buf.get_f64()?,
                v_bottom: buf.get_f64()?,
                exponent: buf.get_f64()?,
            };
            buf.get_f64()?;
            law
        }
        "Linear" => {
            let norm_radius = buf.get_f64()?;
            VelocityLaw::Linear {
                a0: buf.get_f64()?,
                a1: buf.get_f64()?,
                norm_radius,
            }
        }
        "Quadratic" => {
            let norm_radius = buf.get_f64()?;
            VelocityLaw::Quadratic {
                a0: buf.get_f64()?,
                a1: buf.get_f64()?,
                a2: buf.get_f64()?,
                norm_radius,
            }
        }
        "Cubic" => {
            let norm_radius = buf.get_f64()?;
            VelocityLaw::Cubic {
                a0: buf.get_f64()?,
                a1: buf.get_f64()?,
                a2: buf.get_f64()?,
                a3: buf.get_f64()?,
                norm_radius,
            }
        }
        _ => return Err(TauPError::UnknownVelocityLaw(tag)),
    };

    let layer = VelocityLayer::from_law(law, r_top, r_bottom)?
        .with_name(name)
        .with_phase_type(phase_type)
        .with_phase_names(names);

    let limits = match code {
        -1 => None,
        c => {
            let class = LayerClass::from_code(c)
                .ok_or_else(|| TauPError::InvalidHeader(format!("layer type {}", c)))?;
            let critical = retrograde.then(|| CriticalPoint {
                p: p_crit,
                distance: d_crit,
                kind: if slope_top > 0.0 {
                    ExtremumKind::Minimum
                } else {
                    ExtremumKind::Maximum
                },
                radius: r_turn,
                velocity: v_turn,
            });
            Some(LayerLimits {
                class,
                p_min,
                distance_top,
                distance_bottom,
                slope_top,
                slope_bottom,
                critical,
            })
        }
    };
    Ok((layer, limits))
}

/// Write `model` to `path` in native byte order.
pub fn save_model(model: &VelocityModel, path: &Path) -> Result<()> {
    let bytes = encode_model(model, ByteOrder::native(), false)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Read a model written by [`save_model`].
pub fn load_model(path: &Path) -> Result<VelocityModel> {
    let bytes = std::fs::read(path)?;
    decode_model(&bytes)
}

/// Write a first-arrival table as CSV: a header row of distances in
/// degrees, then one row per depth. Missing arrivals are left empty.
pub fn save_table(path: &Path, distances_deg: &[f64], depths: &[f64], times: &Array2<f64>) -> Result<()> {
    if times.dim() != (depths.len(), distances_deg.len()) {
        return Err(TauPError::Other(format!(
            "table shape {:?} does not match {} depths x {} distances",
            times.dim(),
            depths.len(),
            distances_deg.len()
        )));
    }
    let file = std::fs::File::create(path)?;
    let mut w = std::io::BufWriter::new(file);

    write!(w, "depth_km")?;
    for d in distances_deg {
        write!(w, ",{}", d)?;
    }
    writeln!(w)?;
    for (depth, row) in depths.iter().zip(times.rows()) {
        write!(w, "{}", depth)?;
        for &t in row {
            if t.is_nan() {
                write!(w, ",")?;
            } else {
                write!(w, ",{:.6}", t)?;
            }
        }
        writeln!(w)?;
    }
    w.flush()?;
    Ok(())
}
