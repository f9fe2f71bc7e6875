#![no_main]
use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use krds_pack::spec::*;
use krds_pack::*;

fn registry() -> Registry {
    let position = Arc::new(Spec::position());
    let long = Arc::new(Spec::basic(Kind::Long));
    let lpr_old = RecordSpec::new().req_add("position", position.clone()).build();
    let lpr_new = RecordSpec::new()
        .req_add("version", Spec::basic(Kind::Byte))
        .req_add("position", position.clone())
        .opt_add("time", long.clone())
        .build();
    let bookmark = RecordSpec::new()
        .req_add("start", position.clone())
        .req_add("end", position.clone())
        .opt_add("note", Spec::basic(Kind::Utf8))
        .build();
    Registry::new()
        .add("sync_lpr", Spec::basic(Kind::Bool))
        .add("lpr", Spec::choice([lpr_new, lpr_old]))
        .add("erl", position)
        .add("bookmarks", ArraySpec::new(bookmark).build())
        .add("slots", IntMapSpec::new().entry(0, "a", long).entry(7, "b", Spec::object()).build())
        .add("dictionary", Spec::dynamic_map())
}

fuzz_target!(|data: &[u8]| {
    let registry = registry();
    if let Ok(file) = Container::decode(data, &registry) {
        let bytes = file.encode().expect("decoded files re-encode");
        assert_eq!(bytes, data);
    }
});
