//! JSON rendering of tensor values and metadata for CLI output.

use half::{bf16, f16};
use serde_json::{Value, json};
use tensorio_common::{DType, Result, Tensor};
use tensorio_gguf::MetadataValue;

/// Element values of `tensor` in row-major order.
pub fn tensor_values(tensor: &Tensor) -> Result<Vec<Value>> {
    fn each<T, F: Fn(T) -> Value>(values: Vec<T>, f: F) -> Vec<Value> {
        values.into_iter().map(f).collect()
    }

    Ok(match tensor.dtype() {
        DType::Bool => each(tensor.to_bools()?, Value::from),
        DType::U8 => each(tensor.to_vec::<u8>()?, Value::from),
        DType::U16 => each(tensor.to_vec::<u16>()?, Value::from),
        DType::U32 => each(tensor.to_vec::<u32>()?, Value::from),
        DType::U64 => each(tensor.to_vec::<u64>()?, Value::from),
        DType::I8 => each(tensor.to_vec::<i8>()?, Value::from),
        DType::I16 => each(tensor.to_vec::<i16>()?, Value::from),
        DType::I32 => each(tensor.to_vec::<i32>()?, Value::from),
        DType::I64 => each(tensor.to_vec::<i64>()?, Value::from),
        DType::F16 => each(tensor.to_vec::<f16>()?, |v| Value::from(v.to_f64())),
        DType::BF16 => each(tensor.to_vec::<bf16>()?, |v| Value::from(v.to_f64())),
        DType::F32 => each(tensor.to_vec::<f32>()?, |v| Value::from(f64::from(v))),
        DType::F64 => each(tensor.to_vec::<f64>()?, Value::from),
        DType::C64 => {
            // interleaved (re, im) f32 pairs
            let pairs = vec![tensor.numel() * 2];
            let floats =
                Tensor::from_bytes(DType::F32, pairs, tensor.data().to_vec())?.to_vec::<f32>()?;
            floats.chunks_exact(2).map(|c| json!([c[0], c[1]])).collect()
        }
    })
}

pub fn metadata_json(value: &MetadataValue) -> Result<Value> {
    Ok(match value {
        MetadataValue::Empty => Value::Null,
        MetadataValue::Scalar(t) => tensor_values(t)?.into_iter().next().unwrap_or(Value::Null),
        MetadataValue::Array(t) => Value::Array(tensor_values(t)?),
        MetadataValue::String(s) => Value::from(s.as_str()),
        MetadataValue::StringArray(items) => json!(items),
    })
}

/// Text form used by `inspect` and when writing safetensors string metadata.
pub fn metadata_text(value: &MetadataValue) -> Result<String> {
    Ok(match metadata_json(value)? {
        Value::String(s) => s,
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_render_as_plain_values() {
        let v = MetadataValue::Scalar(Tensor::scalar(3.5f32));
        assert_eq!(metadata_json(&v).unwrap(), json!(3.5));
        assert_eq!(metadata_text(&v).unwrap(), "3.5");
    }

    #[test]
    fn arrays_and_strings() {
        let arr = MetadataValue::Array(Tensor::from_slice(&[1i32, 2, 3], &[3]).unwrap());
        assert_eq!(metadata_json(&arr).unwrap(), json!([1, 2, 3]));
        assert_eq!(metadata_text(&MetadataValue::from("llama")).unwrap(), "llama");
        let names = MetadataValue::from(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(metadata_text(&names).unwrap(), r#"["a","b"]"#);
    }

    #[test]
    fn complex_values_are_pairs() {
        let t = Tensor::from_bytes(
            DType::C64,
            vec![1],
            [1.0f32.to_le_bytes(), (-2.0f32).to_le_bytes()].concat(),
        )
        .unwrap();
        assert_eq!(tensor_values(&t).unwrap(), vec![json!([1.0, -2.0])]);
    }

    #[test]
    fn booleans_and_halves() {
        let t = Tensor::from_bools(&[true, false], &[2]).unwrap();
        assert_eq!(tensor_values(&t).unwrap(), vec![json!(true), json!(false)]);
        let h = Tensor::from_slice(&[f16::from_f32(0.5)], &[1]).unwrap();
        assert_eq!(tensor_values(&h).unwrap(), vec![json!(0.5)]);
    }
}
