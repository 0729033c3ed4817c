//! Widening fallback for GGML payloads with no host equivalent
//!
//! Anything the reader cannot copy verbatim or hand to the quantized-weight
//! extractor is decoded element by element into an `F16` tensor. Block layouts
//! follow ggml's reference `dequantize_row_*` routines.

use crate::quant::{block_bytes, read_f16, read_nibble};
use crate::GgmlType;
use half::{bf16, f16};
use tensorio_common::{DType, Result, Tensor, TensorIoError};

const QK_K: usize = 256;

/// Types [`dequantize`] can decode.
pub const DECODABLE: [GgmlType; 10] = [
    GgmlType::Q4_0,
    GgmlType::Q4_1,
    GgmlType::Q5_0,
    GgmlType::Q5_1,
    GgmlType::Q8_0,
    GgmlType::Q4_K,
    GgmlType::Q6_K,
    GgmlType::BF16,
    GgmlType::F64,
    GgmlType::I64,
];

fn undecodable(name: &str, ty: GgmlType) -> TensorIoError {
    TensorIoError::format(format!("`{name}`: GGML type {ty} cannot be decoded"))
}

/// Decode `payload` (GGML type `ty`, host shape `shape`) into an F16 tensor.
pub fn dequantize(name: &str, ty: GgmlType, shape: &[usize], payload: &[u8]) -> Result<Tensor> {
    if !DECODABLE.contains(&ty) {
        return Err(undecodable(name, ty));
    }
    let numel: usize = shape.iter().product();
    let size = ty.byte_size(numel).map_err(|e| TensorIoError::format(format!("`{name}`: {e}")))?;
    let payload = payload.get(..size).ok_or_else(|| {
        TensorIoError::format(format!(
            "`{name}`: {ty} payload has {} bytes, {numel} elements need {size}",
            payload.len()
        ))
    })?;

    let mut out: Vec<f32> = Vec::with_capacity(numel);
    let n_blocks = numel / ty.block_size();
    let block_len = ty.type_size();
    for b in 0..n_blocks {
        let block = block_bytes(payload, b, block_len)?;
        match ty {
            GgmlType::Q4_0 => q4_0(block, &mut out)?,
            GgmlType::Q4_1 => q4_1(block, &mut out)?,
            GgmlType::Q5_0 => q5(block, false, &mut out)?,
            GgmlType::Q5_1 => q5(block, true, &mut out)?,
            GgmlType::Q8_0 => q8_0(block, &mut out)?,
            GgmlType::Q4_K => q4_k(block, &mut out)?,
            GgmlType::Q6_K => q6_k(block, &mut out)?,
            GgmlType::BF16 => out.push(bf16::from_le_bytes([block[0], block[1]]).to_f32()),
            GgmlType::F64 => {
                let mut v = [0u8; 8];
                v.copy_from_slice(block);
                out.push(f64::from_le_bytes(v) as f32);
            }
            GgmlType::I64 => {
                let mut v = [0u8; 8];
                v.copy_from_slice(block);
                out.push(i64::from_le_bytes(v) as f32);
            }
            other => return Err(undecodable(name, other)),
        }
    }
    debug_assert_eq!(out.len(), numel);

    let data = out.into_iter().flat_map(|v| f16::from_f32(v).to_le_bytes()).collect();
    Tensor::from_bytes(DType::F16, shape.to_vec(), data)
}

fn q4_0(block: &[u8], out: &mut Vec<f32>) -> Result<()> {
    let d = read_f16(block, 0)?.to_f32();
    let qs = &block[2..18];
    for i in 0..32 {
        out.push((f32::from(read_nibble(qs, i)?) - 8.0) * d);
    }
    Ok(())
}

fn q4_1(block: &[u8], out: &mut Vec<f32>) -> Result<()> {
    let d = read_f16(block, 0)?.to_f32();
    let m = read_f16(block, 2)?.to_f32();
    let qs = &block[4..20];
    for i in 0..32 {
        out.push(f32::from(read_nibble(qs, i)?) * d + m);
    }
    Ok(())
}

/// Q5_0 (`d, qh, qs`, offset by 16) and Q5_1 (`d, m, qh, qs`, no offset).
fn q5(block: &[u8], with_min: bool, out: &mut Vec<f32>) -> Result<()> {
    let d = read_f16(block, 0)?.to_f32();
    let (m, rest) = if with_min {
        (read_f16(block, 2)?.to_f32(), &block[4..])
    } else {
        (0.0, &block[2..])
    };
    let qh = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]);
    let qs = &rest[4..20];
    let offset = if with_min { 0.0 } else { 16.0 };

    let mut hi = [0f32; 16];
    for j in 0..16 {
        let xh_0 = (((qh >> j) << 4) & 0x10) as u8;
        let xh_1 = ((qh >> (j + 12)) & 0x10) as u8;
        let x0 = f32::from((qs[j] & 0x0F) | xh_0) - offset;
        let x1 = f32::from((qs[j] >> 4) | xh_1) - offset;
        out.push(x0 * d + m);
        hi[j] = x1 * d + m;
    }
    out.extend_from_slice(&hi);
    Ok(())
}

fn q8_0(block: &[u8], out: &mut Vec<f32>) -> Result<()> {
    let d = read_f16(block, 0)?.to_f32();
    out.extend(block[2..34].iter().map(|&q| f32::from(q as i8) * d));
    Ok(())
}

/// 6-bit scale and min `j` of a Q4_K/Q5_K super-block.
fn get_scale_min_k4(j: usize, q: &[u8]) -> (u8, u8) {
    if j < 4 {
        (q[j] & 63, q[j + 4] & 63)
    } else {
        ((q[j + 4] & 0x0F) | ((q[j - 4] >> 6) << 4), (q[j + 4] >> 4) | ((q[j] >> 6) << 4))
    }
}

fn q4_k(block: &[u8], out: &mut Vec<f32>) -> Result<()> {
    let d = read_f16(block, 0)?.to_f32();
    let dmin = read_f16(block, 2)?.to_f32();
    let scales = &block[4..16];
    let qs = &block[16..144];

    for (chunk, q) in qs.chunks_exact(32).enumerate() {
        let (sc1, m1) = get_scale_min_k4(2 * chunk, scales);
        let (sc2, m2) = get_scale_min_k4(2 * chunk + 1, scales);
        let (d1, min1) = (d * f32::from(sc1), dmin * f32::from(m1));
        let (d2, min2) = (d * f32::from(sc2), dmin * f32::from(m2));
        out.extend(q.iter().map(|&b| d1 * f32::from(b & 0x0F) - min1));
        out.extend(q.iter().map(|&b| d2 * f32::from(b >> 4) - min2));
    }
    Ok(())
}

fn q6_k(block: &[u8], out: &mut Vec<f32>) -> Result<()> {
    let ql_all = &block[0..128];
    let qh_all = &block[128..192];
    let sc_all = &block[192..208];
    let d = read_f16(block, 208)?.to_f32();

    for half in 0..QK_K / 128 {
        let ql = &ql_all[64 * half..];
        let qh = &qh_all[32 * half..];
        let sc = &sc_all[8 * half..];
        let mut y = [0f32; 128];
        for l in 0..32 {
            let is = l / 16;
            let q1 = ((ql[l] & 0x0F) | ((qh[l] & 3) << 4)) as i8 - 32;
            let q2 = ((ql[l + 32] & 0x0F) | (((qh[l] >> 2) & 3) << 4)) as i8 - 32;
            let q3 = ((ql[l] >> 4) | (((qh[l] >> 4) & 3) << 4)) as i8 - 32;
            let q4 = ((ql[l + 32] >> 4) | (((qh[l] >> 6) & 3) << 4)) as i8 - 32;
            let s = |k: usize| d * f32::from(sc[is + k] as i8);
            y[l] = s(0) * f32::from(q1);
            y[l + 32] = s(2) * f32::from(q2);
            y[l + 64] = s(4) * f32::from(q3);
            y[l + 96] = s(6) * f32::from(q4);
        }
        out.extend_from_slice(&y);
    }
    Ok(())
}
