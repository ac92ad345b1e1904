//! Fixture builders: small PDFs encrypted with the standard security handler

#![allow(dead_code)]

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use pdfunlock_core::cipher::{aes_cbc_encrypt, pad_pkcs7, rc4};
use pdfunlock_core::security::{pad_password, revision5_hash, revision6_hash, PASSWORD_PADDING};

pub const DOC_ID: &[u8] = b"pdfunlock-fixtur";
pub const TITLE: &[u8] = b"Quarterly Report";
pub const XMP: &[u8] =
    b"<x:xmpmeta xmlns:x=\"adobe:ns:meta/\"><dc:title>Quarterly Report</dc:title></x:xmpmeta>";
const PERMISSIONS: i32 = -3904;

/// Encryption scheme applied by [`encrypted_pdf`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// V1/R2, 40-bit RC4
    Rc4_40,
    /// V2/R3, 128-bit RC4
    Rc4_128,
    /// V4/R4 with an AESV2 crypt filter
    Aes128,
    /// V4/R4 AESV2 with `/EncryptMetadata false`
    Aes128PlainMetadata,
    /// V5/R5 (Adobe extension level 3) with an AESV3 crypt filter
    Aes256R5,
    /// V5/R6 with an AESV3 crypt filter
    Aes256,
}

pub const ALL_SCHEMES: [Scheme; 6] = [
    Scheme::Rc4_40,
    Scheme::Rc4_128,
    Scheme::Aes128,
    Scheme::Aes128PlainMetadata,
    Scheme::Aes256R5,
    Scheme::Aes256,
];

/// An unencrypted PDF with `num_pages` pages, each showing "Page N".
pub fn plain_pdf(num_pages: u32) -> Vec<u8> {
    save(build_document(num_pages))
}

/// A PDF with `num_pages` pages encrypted under `scheme`.
pub fn encrypted_pdf(num_pages: u32, scheme: Scheme, user: &str, owner: &str) -> Vec<u8> {
    let mut doc = build_document(num_pages);

    let (encrypt, cipher) = match scheme {
        Scheme::Rc4_40 => legacy_encryption(2, 5, user, owner, true),
        Scheme::Rc4_128 => legacy_encryption(3, 16, user, owner, true),
        Scheme::Aes128 => legacy_encryption(4, 16, user, owner, true),
        Scheme::Aes128PlainMetadata => legacy_encryption(4, 16, user, owner, false),
        Scheme::Aes256R5 => aes256_encryption(5, user, owner),
        Scheme::Aes256 => aes256_encryption(6, user, owner),
    };

    for (&id, object) in doc.objects.iter_mut() {
        cipher.encrypt_object(id, object);
    }

    let encrypt_id = doc.add_object(encrypt);
    doc.trailer.set("Encrypt", Object::Reference(encrypt_id));
    doc.trailer.set(
        "ID",
        Object::Array(vec![
            Object::String(DOC_ID.to_vec(), StringFormat::Hexadecimal),
            Object::String(DOC_ID.to_vec(), StringFormat::Hexadecimal),
        ]),
    );

    save(doc)
}

/// A one-page V2/R3 RC4 PDF whose font dictionary, object 2, lives in an
/// encrypted object stream (object 6). Written by hand because lopdf only
/// saves plain indirect objects.
pub fn encrypted_pdf_with_object_stream(user: &str, owner: &str) -> Vec<u8> {
    let (encrypt, cipher) = legacy_encryption(3, 16, user, owner, true);

    let mut packed = b"2 0 ".to_vec();
    let first = packed.len();
    packed.extend_from_slice(b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>");
    let packed = cipher.encrypt((6, 0), &packed);
    let content = cipher.encrypt((5, 0), b"BT /F1 12 Tf 100 700 Td (Page 1) Tj ET");

    let mut out = b"%PDF-1.7\n".to_vec();
    let mut offsets = Vec::new();
    push_object(&mut out, &mut offsets, 1, b"<< /Type /Catalog /Pages 3 0 R >>");
    push_object(&mut out, &mut offsets, 3, b"<< /Type /Pages /Kids [4 0 R] /Count 1 >>");
    push_object(
        &mut out,
        &mut offsets,
        4,
        b"<< /Type /Page /Parent 3 0 R /MediaBox [0 0 612 792] /Contents 5 0 R \
          /Resources << /Font << /F1 2 0 R >> >> >>",
    );
    push_object(&mut out, &mut offsets, 5, &raw_stream("", &content));
    push_object(
        &mut out,
        &mut offsets,
        6,
        &raw_stream(&format!("/Type /ObjStm /N 1 /First {}", first), &packed),
    );
    let encrypt_body = format!(
        "<< /Filter /Standard /V 2 /R 3 /Length 128 /P {} /O <{}> /U <{}> >>",
        PERMISSIONS,
        hex(encrypt.get(b"O").unwrap().as_str().unwrap()),
        hex(encrypt.get(b"U").unwrap().as_str().unwrap()),
    );
    push_object(&mut out, &mut offsets, 7, encrypt_body.as_bytes());

    // Cross-reference stream with W [1 4 2]; object 2 is entry 0 of stream 6
    let xref_offset = out.len();
    let mut rows = vec![(0u8, 0u32, 0xFFFFu16); 9];
    for &(id, offset) in &offsets {
        rows[id as usize] = (1, offset as u32, 0);
    }
    rows[2] = (2, 6, 0);
    rows[8] = (1, xref_offset as u32, 0);
    let mut table = Vec::new();
    for (kind, field, extra) in rows {
        table.push(kind);
        table.extend_from_slice(&field.to_be_bytes());
        table.extend_from_slice(&extra.to_be_bytes());
    }
    let id = hex(DOC_ID);
    let xref_dict = format!(
        "/Type /XRef /Size 9 /W [1 4 2] /Root 1 0 R /Encrypt 7 0 R /ID [<{}> <{}>]",
        id, id
    );
    out.extend_from_slice(b"8 0 obj\n");
    out.extend_from_slice(&raw_stream(&xref_dict, &table));
    out.extend_from_slice(b"\nendobj\n");
    out.extend_from_slice(format!("startxref\n{}\n%%EOF\n", xref_offset).as_bytes());
    out
}

fn push_object(out: &mut Vec<u8>, offsets: &mut Vec<(u32, usize)>, id: u32, body: &[u8]) {
    offsets.push((id, out.len()));
    out.extend_from_slice(format!("{} 0 obj\n", id).as_bytes());
    out.extend_from_slice(body);
    out.extend_from_slice(b"\nendobj\n");
}

fn raw_stream(entries: &str, data: &[u8]) -> Vec<u8> {
    let mut out = format!("<< {} /Length {} >>\nstream\n", entries, data.len()).into_bytes();
    out.extend_from_slice(data);
    out.extend_from_slice(b"\nendstream");
    out
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

/// Text shown on each page, in page order.
pub fn page_texts(pdf: &[u8]) -> Vec<String> {
    let doc = Document::load_mem(pdf).unwrap();
    doc.get_pages()
        .values()
        .map(|&page_id| {
            let content = doc.get_page_content(page_id).unwrap();
            let content = Content::decode(&content).unwrap();
            content
                .operations
                .iter()
                .filter(|op| op.operator == "Tj")
                .filter_map(|op| op.operands.first())
                .filter_map(|operand| operand.as_str().ok())
                .map(|text| String::from_utf8_lossy(text).into_owned())
                .collect::<Vec<_>>()
                .join("")
        })
        .collect()
}

/// Body of the catalog's `/Metadata` stream as stored in the file.
pub fn metadata_stream(pdf: &[u8]) -> Vec<u8> {
    let doc = Document::load_mem(pdf).unwrap();
    let metadata_id = doc
        .catalog()
        .unwrap()
        .get(b"Metadata")
        .unwrap()
        .as_reference()
        .unwrap();
    doc.get_object(metadata_id)
        .unwrap()
        .as_stream()
        .unwrap()
        .content
        .clone()
}

/// The `/Title` entry of the document information dictionary.
pub fn info_title(pdf: &[u8]) -> Vec<u8> {
    let doc = Document::load_mem(pdf).unwrap();
    let info_id = doc.trailer.get(b"Info").unwrap().as_reference().unwrap();
    doc.get_dictionary(info_id)
        .unwrap()
        .get(b"Title")
        .unwrap()
        .as_str()
        .unwrap()
        .to_vec()
}

fn build_document(num_pages: u32) -> Document {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut page_ids = Vec::new();
    for i in 0..num_pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![100.into(), 700.into()]),
                Operation::new(
                    "Tj",
                    vec![Object::string_literal(format!("Page {}", i + 1))],
                ),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));

        page_ids.push(doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! {
                    "F1" => font_id,
                },
            },
        }));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids.iter().map(|&id| Object::Reference(id)).collect::<Vec<_>>(),
            "Count" => num_pages as i64,
        }),
    );

    let metadata_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "Metadata",
            "Subtype" => "XML",
        },
        XMP.to_vec(),
    ));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
        "Metadata" => metadata_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::String(TITLE.to_vec(), StringFormat::Literal),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);
    doc
}

fn save(mut doc: Document) -> Vec<u8> {
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

enum Method {
    Rc4,
    Aes128,
    Aes256,
}

struct FixtureCipher {
    key: Vec<u8>,
    method: Method,
    encrypt_metadata: bool,
}

impl FixtureCipher {
    fn encrypt_object(&self, id: ObjectId, object: &mut Object) {
        match object {
            Object::String(bytes, format) => {
                *bytes = self.encrypt(id, bytes);
                *format = StringFormat::Hexadecimal;
            }
            Object::Array(items) => {
                for item in items.iter_mut() {
                    self.encrypt_object(id, item);
                }
            }
            Object::Dictionary(dict) => self.encrypt_dictionary(id, dict),
            Object::Stream(stream) => {
                self.encrypt_dictionary(id, &mut stream.dict);
                if self.encrypt_metadata || !stream.dict.type_is(b"Metadata") {
                    let content = self.encrypt(id, &stream.content);
                    stream.set_content(content);
                }
            }
            _ => {}
        }
    }

    fn encrypt_dictionary(&self, id: ObjectId, dict: &mut Dictionary) {
        for (_, value) in dict.iter_mut() {
            self.encrypt_object(id, value);
        }
    }

    fn encrypt(&self, id: ObjectId, data: &[u8]) -> Vec<u8> {
        match self.method {
            Method::Rc4 => rc4(&object_key(&self.key, id, false), data),
            Method::Aes128 => aes_payload(&object_key(&self.key, id, true), id, data),
            Method::Aes256 => aes_payload(&self.key, id, data),
        }
    }
}

fn object_key(key: &[u8], (num, generation): ObjectId, aes: bool) -> Vec<u8> {
    let mut input = key.to_vec();
    input.extend_from_slice(&num.to_le_bytes()[..3]);
    input.extend_from_slice(&generation.to_le_bytes()[..2]);
    if aes {
        input.extend_from_slice(b"sAlT");
    }
    let digest = md5::compute(&input);
    digest.0[..(key.len() + 5).min(16)].to_vec()
}

/// IV ‖ AES-CBC(PKCS#7(data)), with an IV derived from the object id.
fn aes_payload(key: &[u8], (num, generation): ObjectId, data: &[u8]) -> Vec<u8> {
    let iv = md5::compute(format!("iv {} {}", num, generation)).0;
    let mut out = iv.to_vec();
    out.extend(aes_cbc_encrypt(key, &iv, &pad_pkcs7(data)).unwrap());
    out
}

fn xor_key(key: &[u8], i: u8) -> Vec<u8> {
    key.iter().map(|b| b ^ i).collect()
}

/// Latin-1 bytes, the way PDFDocEncoding writers store accented passwords.
fn latin1(password: &str) -> Vec<u8> {
    password.chars().map(|c| c as u8).collect()
}

fn legacy_encryption(
    revision: i64,
    key_len: usize,
    user: &str,
    owner: &str,
    encrypt_metadata: bool,
) -> (Dictionary, FixtureCipher) {
    let user = latin1(user);
    let owner = latin1(owner);

    // O entry
    let mut hash = md5::compute(pad_password(&owner)).0.to_vec();
    if revision >= 3 {
        for _ in 0..50 {
            hash = md5::compute(&hash).0.to_vec();
        }
    }
    let owner_key = &hash[..key_len];
    let mut o = rc4(owner_key, &pad_password(&user));
    if revision >= 3 {
        for i in 1..=19u8 {
            o = rc4(&xor_key(owner_key, i), &o);
        }
    }

    // File key
    let mut context = md5::Context::new();
    context.consume(pad_password(&user));
    context.consume(&o);
    context.consume((PERMISSIONS as u32).to_le_bytes());
    context.consume(DOC_ID);
    if !encrypt_metadata {
        context.consume([0xFF, 0xFF, 0xFF, 0xFF]);
    }
    let mut key = context.finalize().0.to_vec();
    if revision >= 3 {
        for _ in 0..50 {
            key = md5::compute(&key[..key_len]).0.to_vec();
        }
    }
    key.truncate(key_len);

    // U entry
    let u = if revision == 2 {
        rc4(&key, &PASSWORD_PADDING)
    } else {
        let mut context = md5::Context::new();
        context.consume(PASSWORD_PADDING);
        context.consume(DOC_ID);
        let mut u = rc4(&key, &context.finalize().0);
        for i in 1..=19u8 {
            u = rc4(&xor_key(&key, i), &u);
        }
        u.resize(32, 0);
        u
    };

    let mut encrypt = dictionary! {
        "Filter" => "Standard",
        "R" => revision,
        "O" => Object::String(o, StringFormat::Hexadecimal),
        "U" => Object::String(u, StringFormat::Hexadecimal),
        "P" => PERMISSIONS as i64,
    };

    let method = match revision {
        2 => {
            encrypt.set("V", 1_i64);
            encrypt.set("Length", 40_i64);
            Method::Rc4
        }
        3 => {
            encrypt.set("V", 2_i64);
            encrypt.set("Length", 128_i64);
            Method::Rc4
        }
        _ => {
            encrypt.set("V", 4_i64);
            encrypt.set("Length", 128_i64);
            encrypt.set("CF", crypt_filters("AESV2", 16));
            encrypt.set("StmF", "StdCF");
            encrypt.set("StrF", "StdCF");
            if !encrypt_metadata {
                encrypt.set("EncryptMetadata", false);
            }
            Method::Aes128
        }
    };

    (
        encrypt,
        FixtureCipher {
            key,
            method,
            encrypt_metadata,
        },
    )
}

fn aes256_encryption(revision: i64, user: &str, owner: &str) -> (Dictionary, FixtureCipher) {
    let file_key: Vec<u8> = (0u8..32).map(|b| b.wrapping_mul(7).wrapping_add(3)).collect();
    let zero_iv = [0u8; 16];
    let hash = |password: &str, salt: &[u8], vector: Option<&[u8]>| {
        if revision == 5 {
            revision5_hash(password.as_bytes(), salt, vector)
        } else {
            revision6_hash(password.as_bytes(), salt, vector).unwrap()
        }
    };

    let user_validation_salt = b"uvsalt01";
    let user_key_salt = b"uksalt01";
    let mut u = hash(user, user_validation_salt, None);
    u.extend_from_slice(user_validation_salt);
    u.extend_from_slice(user_key_salt);
    let user_intermediate = hash(user, user_key_salt, None);
    let ue = aes_cbc_encrypt(&user_intermediate, &zero_iv, &file_key).unwrap();

    let owner_validation_salt = b"ovsalt01";
    let owner_key_salt = b"oksalt01";
    let mut o = hash(owner, owner_validation_salt, Some(u.as_slice()));
    o.extend_from_slice(owner_validation_salt);
    o.extend_from_slice(owner_key_salt);
    let owner_intermediate = hash(owner, owner_key_salt, Some(u.as_slice()));
    let oe = aes_cbc_encrypt(&owner_intermediate, &zero_iv, &file_key).unwrap();

    let encrypt = dictionary! {
        "Filter" => "Standard",
        "V" => 5_i64,
        "R" => revision,
        "Length" => 256_i64,
        "CF" => crypt_filters("AESV3", 32),
        "StmF" => "StdCF",
        "StrF" => "StdCF",
        "O" => Object::String(o, StringFormat::Hexadecimal),
        "U" => Object::String(u, StringFormat::Hexadecimal),
        "OE" => Object::String(oe, StringFormat::Hexadecimal),
        "UE" => Object::String(ue, StringFormat::Hexadecimal),
        "Perms" => Object::String(vec![0u8; 16], StringFormat::Hexadecimal),
        "P" => PERMISSIONS as i64,
    };

    (
        encrypt,
        FixtureCipher {
            key: file_key,
            method: Method::Aes256,
            encrypt_metadata: true,
        },
    )
}

fn crypt_filters(method: &str, length: i64) -> Dictionary {
    dictionary! {
        "StdCF" => dictionary! {
            "Type" => "CryptFilter",
            "CFM" => Object::Name(method.as_bytes().to_vec()),
            "AuthEvent" => "DocOpen",
            "Length" => length,
        },
    }
}
