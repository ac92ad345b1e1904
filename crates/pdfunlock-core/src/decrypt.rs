//! Password removal
//!
//! Loads the document, authenticates against its security handler, decrypts
//! every string and stream in place and writes the document back out without
//! an `/Encrypt` entry.
//!
//! Object streams are encrypted as a whole, so they are kept packed while
//! loading and only expanded once their content is readable.

use lopdf::{Dictionary, Document, Object, ObjectId, ObjectStream, Reader};
use tracing::debug;

use crate::error::DecryptError;
use crate::security::StandardSecurityHandler;

/// Remove the encryption envelope from `document` using `password`.
///
/// The algorithm:
/// 1. Parse the document without assuming it is encrypted
/// 2. If there is no `/Encrypt` entry, fail with `NotEncrypted`
/// 3. Authenticate the password (user, then owner)
/// 4. Decrypt all strings and stream bodies, skipping the encryption
///    dictionary and cross-reference streams
/// 5. Unpack object streams into plain indirect objects
/// 6. Drop `/Encrypt` and serialize into a fresh buffer
pub fn decrypt(document: &[u8], password: &str) -> Result<Vec<u8>, DecryptError> {
    let mut doc = load_packed(document)?;

    let (encrypt_id, encrypt) = encryption_dictionary(&doc)?.ok_or(DecryptError::NotEncrypted)?;
    let doc_id = first_document_id(&doc.trailer);

    let handler = StandardSecurityHandler::authenticate(&encrypt, &doc_id, password)?;
    debug!(
        "Authenticated R{} security handler, decrypting {} objects",
        handler.revision(),
        doc.objects.len()
    );

    for (&id, object) in doc.objects.iter_mut() {
        if Some(id) == encrypt_id || is_xref_stream(object) {
            continue;
        }
        decrypt_object(&handler, id, object)?;
    }

    doc.trailer.remove(b"Encrypt");
    if let Some(id) = encrypt_id {
        doc.objects.remove(&id);
    }

    let unpacked = unpack_object_streams(&mut doc)?;
    if unpacked > 0 {
        debug!("Unpacked {} objects from object streams", unpacked);
    }

    if doc.get_pages().is_empty() {
        return Err(DecryptError::MalformedOrUnsupported(
            "no readable pages after decryption".into(),
        ));
    }

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| DecryptError::MalformedOrUnsupported(format!("Save failed: {}", e)))?;

    Ok(buffer)
}

/// Whether `document` carries an encryption envelope.
pub fn is_encrypted(document: &[u8]) -> Result<bool, DecryptError> {
    let doc = load(document)?;
    Ok(doc.trailer.get(b"Encrypt").is_ok())
}

/// Number of pages reachable from the page tree.
pub fn page_count(document: &[u8]) -> Result<u32, DecryptError> {
    let doc = load(document)?;
    Ok(doc.get_pages().len() as u32)
}

fn load(document: &[u8]) -> Result<Document, DecryptError> {
    Document::load_mem(document).map_err(|e| DecryptError::MalformedOrUnsupported(e.to_string()))
}

/// Stand-in `/Type` for object streams between loading and decryption.
const PACKED_OBJECT_STREAM: &[u8] = b"PdfUnlockObjStm";

/// Load without expanding object streams. lopdf parses `/ObjStm` content
/// on load and silently drops any stream it cannot parse, which is every
/// stream of an encrypted file.
fn load_packed(document: &[u8]) -> Result<Document, DecryptError> {
    Reader {
        buffer: document,
        document: Document::new(),
    }
    .read(Some(keep_object_streams_packed))
    .map_err(|e| DecryptError::MalformedOrUnsupported(e.to_string()))
}

fn keep_object_streams_packed(id: ObjectId, object: &mut Object) -> Option<(ObjectId, Object)> {
    if let Object::Stream(stream) = object {
        if stream.dict.type_is(b"ObjStm") {
            stream.dict.set("Type", Object::Name(PACKED_OBJECT_STREAM.to_vec()));
        }
    }
    Some((id, object.clone()))
}

/// Replace every packed object stream with the objects it holds. Objects
/// already present at top level win, as they come from later updates.
fn unpack_object_streams(doc: &mut Document) -> Result<usize, DecryptError> {
    let packed: Vec<ObjectId> = doc
        .objects
        .iter()
        .filter(|(_, object)| {
            matches!(object, Object::Stream(stream) if stream.dict.type_is(PACKED_OBJECT_STREAM))
        })
        .map(|(&id, _)| id)
        .collect();

    let mut unpacked = 0;
    for id in packed {
        let Some(Object::Stream(mut stream)) = doc.objects.remove(&id) else {
            continue;
        };
        stream.dict.set("Type", Object::Name(b"ObjStm".to_vec()));
        let contained = ObjectStream::new(&mut stream).map_err(|e| {
            DecryptError::MalformedOrUnsupported(format!(
                "unreadable object stream {:?}: {}",
                id, e
            ))
        })?;
        for (object_id, object) in contained.objects {
            doc.objects.entry(object_id).or_insert(object);
            unpacked += 1;
        }
    }
    Ok(unpacked)
}

/// Resolve the trailer's `/Encrypt` entry, which may be direct or indirect.
fn encryption_dictionary(
    doc: &Document,
) -> Result<Option<(Option<ObjectId>, Dictionary)>, DecryptError> {
    let entry = match doc.trailer.get(b"Encrypt") {
        Ok(entry) => entry,
        Err(_) => return Ok(None),
    };

    match entry {
        Object::Reference(id) => {
            let dict = doc
                .get_object(*id)
                .and_then(Object::as_dict)
                .map_err(|e| {
                    DecryptError::MalformedOrUnsupported(format!(
                        "unreadable /Encrypt dictionary {:?}: {}",
                        id, e
                    ))
                })?;
            Ok(Some((Some(*id), dict.clone())))
        }
        Object::Dictionary(dict) => Ok(Some((None, dict.clone()))),
        _ => Err(DecryptError::MalformedOrUnsupported(
            "/Encrypt is neither a dictionary nor a reference".into(),
        )),
    }
}

/// First element of the trailer `/ID` array, or empty if absent.
fn first_document_id(trailer: &Dictionary) -> Vec<u8> {
    trailer
        .get(b"ID")
        .and_then(Object::as_array)
        .ok()
        .and_then(|ids| ids.first())
        .and_then(|id| id.as_str().ok())
        .map(<[u8]>::to_vec)
        .unwrap_or_default()
}

fn is_xref_stream(object: &Object) -> bool {
    match object {
        Object::Stream(stream) => stream
            .dict
            .get(b"Type")
            .and_then(Object::as_name)
            .map(|name| name == b"XRef")
            .unwrap_or(false),
        _ => false,
    }
}

/// Recursively decrypt strings and stream bodies belonging to object `id`.
fn decrypt_object(
    handler: &StandardSecurityHandler,
    id: ObjectId,
    object: &mut Object,
) -> Result<(), DecryptError> {
    match object {
        Object::String(bytes, _) => {
            *bytes = handler.decrypt_string(id, bytes)?;
        }
        Object::Array(items) => {
            for item in items.iter_mut() {
                decrypt_object(handler, id, item)?;
            }
        }
        Object::Dictionary(dict) => decrypt_dictionary(handler, id, dict)?,
        Object::Stream(stream) => {
            decrypt_dictionary(handler, id, &mut stream.dict)?;
            let content = handler.decrypt_stream(id, &stream.dict, &stream.content)?;
            stream.set_content(content);
        }
        _ => {}
    }
    Ok(())
}

fn decrypt_dictionary(
    handler: &StandardSecurityHandler,
    id: ObjectId,
    dict: &mut Dictionary,
) -> Result<(), DecryptError> {
    for (_, value) in dict.iter_mut() {
        decrypt_object(handler, id, value)?;
    }
    Ok(())
}
