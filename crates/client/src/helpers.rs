//! Typed convenience helpers layered on the byte API.
//!
//! These are pure client-side encodings: strings are stored
//! NUL-terminated, integers as decimal ASCII with a trailing NUL. The
//! broker sees opaque bytes either way. `key == None` addresses `path`
//! itself, otherwise `path/key`.

use std::io::Write;

fn joined(path: &str, key: Option<&str>) -> String {
	match key {
		Some(key) => format!("{path}/{key}"),
		None => path.to_string(),
	}
}

fn strip_nul(bytes: &[u8]) -> &[u8] {
	match bytes.split_last() {
		Some((0, head)) => head,
		_ => bytes,
	}
}

/// Stores `value` as NUL-terminated text; `None` deletes the node.
pub fn set_string(path: &str, key: Option<&str>, value: Option<&str>) -> bool {
	let full = joined(path, key);
	let bytes = value.map_or_else(Vec::new, |v| {
		let mut bytes = v.as_bytes().to_vec();
		bytes.push(0);
		bytes
	});
	crate::set(&full, &bytes)
}

/// Reads a value stored by [`set_string`].
#[must_use]
pub fn get_string(path: &str, key: Option<&str>) -> Option<String> {
	let full = joined(path, key);
	let bytes = crate::get(&full)?;
	Some(String::from_utf8_lossy(strip_nul(&bytes)).into_owned())
}

/// Stores `value` as decimal ASCII text.
pub fn set_int(path: &str, key: Option<&str>, value: i32) -> bool {
	set_string(path, key, Some(&value.to_string()))
}

/// Reads a value stored by [`set_int`]; -1 when absent or unparsable.
#[must_use]
pub fn get_int(path: &str, key: Option<&str>) -> i32 {
	get_string(path, key)
		.and_then(|text| text.trim().parse().ok())
		.unwrap_or(-1)
}

/// Recursively writes `path` and everything below it to `out`, one
/// `path value` line per stored node.
pub fn dump(path: &str, out: &mut dyn Write) -> std::io::Result<()> {
	if !path.ends_with('/')
		&& let Some(value) = crate::get(path)
	{
		writeln!(out, "{:<64}{}", path, String::from_utf8_lossy(strip_nul(&value)))?;
	}

	let root = if path.ends_with('/') {
		path.to_string()
	} else {
		format!("{path}/")
	};
	for child in crate::search(&root) {
		dump(&child, out)?;
	}
	Ok(())
}
