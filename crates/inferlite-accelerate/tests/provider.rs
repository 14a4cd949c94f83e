use inferlite_accelerate::{
    ensure_image_context, image_context, register_image_context, ImageContextOptions,
};

#[test]
fn first_registration_wins() {
    assert!(image_context().is_none());

    let first = match register_image_context(ImageContextOptions {
        image_tile: Some(4),
        ..Default::default()
    }) {
        Ok(ctx) => ctx,
        Err(err) => {
            eprintln!("skipping GPU provider test: {err}");
            assert!(image_context().is_none());
            return;
        }
    };
    assert_eq!(first.image_tile(), 4);

    let second = register_image_context(ImageContextOptions {
        image_tile: Some(2),
        ..Default::default()
    })
    .expect("already registered");
    assert!(std::ptr::eq(first, second));
    assert_eq!(second.image_tile(), 4);

    let current = image_context().expect("registered context");
    assert!(std::ptr::eq(first, current));
    let ensured = ensure_image_context().expect("ensured context");
    assert!(std::ptr::eq(first, ensured));
}
