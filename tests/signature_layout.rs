// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Signature construction: sorting, lookup, determinism, compatibility.

use signatures_and_slots::Signature;
use signatures_and_slots::backend::headless::Headless;
use signatures_and_slots::signature::descriptor::*;

fn desc_with(resources: Vec<ResourceDescriptor>) -> SignatureDesc {
    SignatureDesc {
        label: "test".into(),
        resources,
        ..Default::default()
    }
}

fn sig(desc: &SignatureDesc) -> Signature<Headless> {
    Signature::new(desc).unwrap()
}

#[test]
fn resources_sort_stably_by_class() {
    let desc = desc_with(vec![
        ResourceDescriptor::new("dyn_a", ShaderStages::PIXEL, ResourceKind::TextureSrv, VariableClass::Dynamic),
        ResourceDescriptor::new("static_a", ShaderStages::PIXEL, ResourceKind::TextureSrv, VariableClass::Static),
        ResourceDescriptor::new("mut_a", ShaderStages::PIXEL, ResourceKind::TextureSrv, VariableClass::Mutable),
        ResourceDescriptor::new("static_b", ShaderStages::PIXEL, ResourceKind::TextureSrv, VariableClass::Static),
        ResourceDescriptor::new("dyn_b", ShaderStages::PIXEL, ResourceKind::TextureSrv, VariableClass::Dynamic),
    ]);
    let signature = sig(&desc);

    let names: Vec<_> = signature.resources().iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["static_a", "static_b", "mut_a", "dyn_a", "dyn_b"]);

    assert_eq!(signature.class_range(VariableClass::Static), 0..2);
    assert_eq!(signature.class_range(VariableClass::Mutable), 2..3);
    assert_eq!(signature.class_range(VariableClass::Dynamic), 3..5);
}

#[test]
fn find_resource_respects_stage_visibility() {
    // Same name on disjoint stages is legal and resolves per stage.
    let desc = desc_with(vec![
        ResourceDescriptor::new("tex", ShaderStages::VERTEX, ResourceKind::TextureSrv, VariableClass::Static),
        ResourceDescriptor::new("tex", ShaderStages::PIXEL, ResourceKind::TextureSrv, VariableClass::Mutable),
    ]);
    let signature = sig(&desc);

    let vertex = signature.find_resource(ShaderStages::VERTEX, "tex").unwrap();
    let pixel = signature.find_resource(ShaderStages::PIXEL, "tex").unwrap();
    assert_ne!(vertex, pixel);
    assert_eq!(signature.resources()[vertex].class, VariableClass::Static);
    assert_eq!(signature.resources()[pixel].class, VariableClass::Mutable);
    assert!(signature.find_resource(ShaderStages::GEOMETRY, "tex").is_none());
    assert!(signature.find_resource(ShaderStages::PIXEL, "missing").is_none());
}

#[test]
fn identical_descriptions_build_identical_layouts() {
    let desc = desc_with(vec![
        ResourceDescriptor::new("cb", ShaderStages::VERTEX, ResourceKind::ConstantBuffer, VariableClass::Static),
        ResourceDescriptor::new("tex", ShaderStages::PIXEL, ResourceKind::TextureSrv, VariableClass::Mutable)
            .with_array_size(4),
        ResourceDescriptor::new("storage", ShaderStages::PIXEL, ResourceKind::BufferUav, VariableClass::Dynamic)
            .with_flags(ResourceFlags::NO_DYNAMIC_BUFFERS),
    ]);
    let a = sig(&desc);
    let b = sig(&desc);

    assert_eq!(a.hash(), b.hash());
    assert!(a.is_compatible_with(&b));
    assert_eq!(a.attribs(), b.attribs());
}

#[test]
fn compatibility_ignores_names_only() {
    let base = desc_with(vec![
        ResourceDescriptor::new("cb", ShaderStages::VERTEX, ResourceKind::ConstantBuffer, VariableClass::Static),
        ResourceDescriptor::new("tex", ShaderStages::PIXEL, ResourceKind::TextureSrv, VariableClass::Mutable),
    ]);

    let mut renamed = base.clone();
    renamed.label = "other".into();
    renamed.resources[0].name = "globals".into();
    renamed.resources[1].name = "albedo".into();
    assert_eq!(sig(&base).hash(), sig(&renamed).hash());
    assert!(sig(&base).is_compatible_with(&sig(&renamed)));

    let mut resized = base.clone();
    resized.resources[1].array_size = 2;
    assert_ne!(sig(&base).hash(), sig(&resized).hash());
    assert!(!sig(&base).is_compatible_with(&sig(&resized)));

    let mut reclassed = base.clone();
    reclassed.resources[1].class = VariableClass::Dynamic;
    assert!(!sig(&base).is_compatible_with(&sig(&reclassed)));

    let mut rebased = base.clone();
    rebased.binding_index = 1;
    assert!(!sig(&base).is_compatible_with(&sig(&rebased)));
}

#[test]
fn root_views_and_tables_split_as_expected() {
    let desc = desc_with(vec![
        // Plain single constant buffer: direct root view.
        ResourceDescriptor::new("cb", ShaderStages::VERTEX, ResourceKind::ConstantBuffer, VariableClass::Static),
        // Formatted buffer: must go through a table.
        ResourceDescriptor::new("fmt", ShaderStages::VERTEX, ResourceKind::BufferSrv, VariableClass::Static)
            .with_flags(ResourceFlags::FORMATTED_BUFFER),
        // Sampler: sampler-heap table.
        ResourceDescriptor::new("sam", ShaderStages::PIXEL, ResourceKind::Sampler, VariableClass::Mutable),
    ]);
    let signature = sig(&desc);

    assert_eq!(signature.params().views().len(), 1);
    assert_eq!(signature.params().tables().len(), 2);

    let cb = signature.find_resource(ShaderStages::VERTEX, "cb").unwrap();
    let fmt = signature.find_resource(ShaderStages::VERTEX, "fmt").unwrap();
    assert!(signature.attribs()[cb].root_view);
    assert!(!signature.attribs()[fmt].root_view);
}

#[test]
fn binding_index_sets_the_base_register_space() {
    let desc = SignatureDesc {
        label: "spaced".into(),
        binding_index: 2,
        resources: vec![
            ResourceDescriptor::new("tex", ShaderStages::PIXEL, ResourceKind::TextureSrv, VariableClass::Mutable),
            ResourceDescriptor::new("arr", ShaderStages::PIXEL, ResourceKind::TextureSrv, VariableClass::Mutable)
                .with_flags(ResourceFlags::RUNTIME_ARRAY)
                .with_array_size(16),
        ],
        ..Default::default()
    };
    let signature = sig(&desc);

    let tex = signature.find_resource(ShaderStages::PIXEL, "tex").unwrap();
    let arr = signature.find_resource(ShaderStages::PIXEL, "arr").unwrap();
    assert_eq!(signature.attribs()[tex].register_space, 2);
    assert_eq!(signature.attribs()[arr].register_space, 3);
    assert_eq!(signature.attribs()[arr].bind_point, 0);
}

#[test]
fn combined_sampler_pairing_resolves_by_suffix_and_class() {
    let desc = SignatureDesc {
        label: "combined".into(),
        resources: vec![
            ResourceDescriptor::new("g_Tex", ShaderStages::PIXEL, ResourceKind::TextureSrv, VariableClass::Mutable)
                .with_flags(ResourceFlags::COMBINED_SAMPLER),
            ResourceDescriptor::new("g_Tex_sampler", ShaderStages::PIXEL, ResourceKind::Sampler, VariableClass::Mutable),
        ],
        combined_sampler_suffix: Some("_sampler".into()),
        ..Default::default()
    };
    let signature = sig(&desc);

    let tex = signature.find_resource(ShaderStages::PIXEL, "g_Tex").unwrap();
    let sam = signature.find_resource(ShaderStages::PIXEL, "g_Tex_sampler").unwrap();
    assert_eq!(signature.attribs()[tex].assigned_sampler, Some(sam));
}

#[test]
fn class_mismatch_between_texture_and_combined_sampler_is_rejected() {
    let desc = SignatureDesc {
        label: "combined".into(),
        resources: vec![
            ResourceDescriptor::new("g_Tex", ShaderStages::PIXEL, ResourceKind::TextureSrv, VariableClass::Mutable)
                .with_flags(ResourceFlags::COMBINED_SAMPLER),
            ResourceDescriptor::new("g_Tex_sampler", ShaderStages::PIXEL, ResourceKind::Sampler, VariableClass::Dynamic),
        ],
        combined_sampler_suffix: Some("_sampler".into()),
        ..Default::default()
    };
    assert!(matches!(
        Signature::<Headless>::new(&desc),
        Err(signatures_and_slots::SignatureError::SamplerClassMismatch { .. })
    ));
}

#[test]
fn immutable_sampler_matches_through_the_suffix() {
    // The immutable sampler is declared under the texture's name; the
    // declared sampler resource carries the suffix.
    let desc = SignatureDesc {
        label: "imm".into(),
        resources: vec![
            ResourceDescriptor::new("g_Tex", ShaderStages::PIXEL, ResourceKind::TextureSrv, VariableClass::Mutable)
                .with_flags(ResourceFlags::COMBINED_SAMPLER),
            ResourceDescriptor::new("g_Tex_sampler", ShaderStages::PIXEL, ResourceKind::Sampler, VariableClass::Mutable),
        ],
        immutable_samplers: vec![ImmutableSamplerDesc::new(
            "g_Tex",
            ShaderStages::PIXEL,
            SamplerDesc::default(),
        )],
        combined_sampler_suffix: Some("_sampler".into()),
        ..Default::default()
    };
    let signature = sig(&desc);

    let sam = signature.find_resource(ShaderStages::PIXEL, "g_Tex_sampler").unwrap();
    assert!(signature.attribs()[sam].immutable_sampler);
    assert_eq!(signature.attribs()[sam].context_root_index, None);
    assert_eq!(
        signature.immutable_sampler_attribs()[0].bind_point,
        signature.attribs()[sam].bind_point
    );
}
