use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::{env, fs, io};

/// Extension of the per-partition table files.
pub const TABLE_EXTENSION: &str = "bin";

/// Subdirectory of the data directory that corpus files are imported from.
pub const CORPUS_DIR: &str = "corpus";

/// Reads a corpus file and returns its non-blank lines.
///
/// - Reads the entire file into memory
/// - Splits on `\n` / `\r\n`
pub(crate) fn read_lines<P: AsRef<Path>>(filename: P) -> io::Result<Vec<String>> {
	let mut contents = String::new();
	File::open(filename)?.read_to_string(&mut contents)?;
	Ok(contents
		.lines()
		.filter(|line| !line.trim().is_empty())
		.map(str::to_owned)
		.collect())
}

/// Turns a partition key into something safe to use as a file stem.
///
/// `%`, path separators and NUL are percent-encoded, everything else is kept
/// so that `#rust` stays `#rust` on disk. [`restore_partition`] reverses it.
pub(crate) fn sanitize_partition(key: &str) -> String {
	let mut stem = String::with_capacity(key.len());
	for c in key.chars() {
		match c {
			'%' | '/' | '\\' | '\0' => stem.push_str(&format!("%{:02X}", c as u32)),
			c => stem.push(c),
		}
	}
	stem
}

/// Recovers the partition key from a file stem built by [`sanitize_partition`].
///
/// Returns `None` for a malformed escape.
pub(crate) fn restore_partition(stem: &str) -> Option<String> {
	let mut key = String::with_capacity(stem.len());
	let mut chars = stem.chars();
	while let Some(c) = chars.next() {
		if c != '%' {
			key.push(c);
			continue;
		}
		let hex: String = chars.by_ref().take(2).collect();
		let code = u8::from_str_radix(&hex, 16).ok().filter(|_| hex.len() == 2)?;
		key.push(char::from(code));
	}
	Some(key)
}

/// Builds the table path of a partition inside the data directory.
///
/// Example:
/// `data` + `"#rust"` → `data/#rust.bin`
///
/// The extension is appended rather than set, so a dotted channel name
/// such as `#rust.dev` keeps its full name.
pub(crate) fn partition_path<P: AsRef<Path>>(data_dir: P, key: &str) -> PathBuf {
	data_dir
		.as_ref()
		.join(format!("{}.{}", sanitize_partition(key), TABLE_EXTENSION))
}

/// Builds the temporary path a table is written to before being renamed
/// over its final location.
pub(crate) fn temporary_path(path: &Path) -> PathBuf {
	let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
	name.push(".tmp");
	path.with_file_name(name)
}

/// Writes `bytes` to `path` through a temporary file so readers never see a
/// half-written table.
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
	let temporary = temporary_path(path);
	fs::write(&temporary, bytes)?;
	fs::rename(&temporary, path)
}

/// Extracts the base filename without extension.
///
/// Examples:
/// - `"./data/#rust.bin"` → `"#rust"`
/// - `"#rust.dev.bin"` → `"#rust.dev"`
pub(crate) fn get_filename<P: AsRef<Path>>(input_path: P) -> io::Result<String> {
	let stem = input_path
		.as_ref()
		.file_stem()
		.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Path has no filename"))?;

	Ok(stem.to_string_lossy().to_string())
}

/// Resolves a corpus name inside `corpus_dir`.
///
/// The name must be a relative path made of plain components, and the
/// resolved file (symlinks followed) must still live under `corpus_dir`.
pub(crate) fn corpus_path(corpus_dir: &Path, name: &Path) -> io::Result<PathBuf> {
	let plain = name.components().all(|c| matches!(c, Component::Normal(_)));
	if name.as_os_str().is_empty() || !plain {
		return Err(io::Error::new(
			io::ErrorKind::InvalidInput,
			format!("{} is not a relative corpus name", name.display()),
		));
	}

	let root = corpus_dir.canonicalize()?;
	let path = root.join(name).canonicalize()?;
	if !path.starts_with(&root) {
		return Err(io::Error::new(
			io::ErrorKind::PermissionDenied,
			format!("{} escapes the corpus directory", name.display()),
		));
	}
	Ok(path)
}

/// Normalize a folder path.
///
/// - `"."` or `"./"` resolves to the current working directory
/// - Other paths are returned as-is (not canonicalized)
pub fn normalize_folder<P: AsRef<Path>>(input: P) -> PathBuf {
	let input = input.as_ref();
	if input == Path::new(".") || input == Path::new("./") {
		env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
	} else {
		input.to_path_buf()
	}
}

/// Lists all files with a given extension in a directory.
///
/// Returns file names only (no paths), sorted. A missing directory is
/// reported as empty.
pub(crate) fn list_files<P: AsRef<Path>>(dir: P, extension: &str) -> io::Result<Vec<String>> {
	let mut files = Vec::new();

	let entries = match fs::read_dir(dir) {
		Ok(entries) => entries,
		Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(files),
		Err(e) => return Err(e),
	};

	for entry in entries {
		let path = entry?.path();
		if path.is_file() && path.extension() == Some(std::ffi::OsStr::new(extension)) {
			if let Some(name) = path.file_name() {
				files.push(name.to_string_lossy().to_string());
			}
		}
	}

	files.sort();
	Ok(files)
}
