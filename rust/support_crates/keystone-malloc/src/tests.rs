use std::ptr::NonNull;

use crate::{
    BinnedMalloc, DEFAULT_ALIGNMENT, Malloc, SystemMalloc,
    align::{align_down, align_up, checked_align_up, is_aligned, is_ptr_aligned},
};

#[test]
fn test_align_helpers() {
    assert_eq!(align_up(13, 4), 16);
    assert_eq!(align_down(13, 4), 12);
    assert!(is_aligned(64, 64));
    assert!(!is_aligned(65, 64));
    assert_eq!(checked_align_up(usize::MAX - 3, 8), None);
}

#[test]
fn test_system_quantize() {
    assert_eq!(SystemMalloc::quantize_size(1, 0), DEFAULT_ALIGNMENT);
    assert_eq!(SystemMalloc::quantize_size(16, 0), 16);
    assert_eq!(SystemMalloc::quantize_size(17, 0), 32);
    assert_eq!(SystemMalloc::quantize_size(17, 64), 64);
    assert_eq!(SystemMalloc::quantize_size(usize::MAX, 16), usize::MAX);
}

#[test]
fn test_null_and_zero_is_noop() {
    let p = unsafe { SystemMalloc::realloc(None, 0, 0, DEFAULT_ALIGNMENT) };
    assert!(p.is_none());
    let p = unsafe { BinnedMalloc::realloc(None, 0, 0, DEFAULT_ALIGNMENT) };
    assert!(p.is_none());
}

#[test]
fn test_system_realloc_preserves_bytes() {
    unsafe {
        let p = SystemMalloc::realloc(None, 0, 8, DEFAULT_ALIGNMENT).unwrap();
        for i in 0..8 {
            p.as_ptr().add(i).write(i as u8 + 1);
        }
        let p = SystemMalloc::realloc(Some(p), 8, 4096, DEFAULT_ALIGNMENT).unwrap();
        let bytes = std::slice::from_raw_parts(p.as_ptr(), 8);
        assert_eq!(bytes, &[1, 2, 3, 4, 5, 6, 7, 8]);

        let p = SystemMalloc::realloc(Some(p), 4096, 3, DEFAULT_ALIGNMENT).unwrap();
        let bytes = std::slice::from_raw_parts(p.as_ptr(), 3);
        assert_eq!(bytes, &[1, 2, 3]);

        assert!(SystemMalloc::realloc(Some(p), 3, 0, DEFAULT_ALIGNMENT).is_none());
    }
}

#[test]
fn test_large_alignment_is_honored() {
    for &alignment in &[32usize, 64, 128, 4096] {
        unsafe {
            let p = SystemMalloc::realloc(None, 0, 100, alignment).unwrap();
            assert!(is_ptr_aligned(p.as_ptr(), alignment));
            let p = SystemMalloc::realloc(Some(p), 100, 10_000, alignment).unwrap();
            assert!(is_ptr_aligned(p.as_ptr(), alignment));
            SystemMalloc::realloc(Some(p), 10_000, 0, alignment);
        }
    }
}

#[test]
fn test_bin_sizes() {
    assert_eq!(BinnedMalloc::bin_size(0), Some(0));
    assert_eq!(BinnedMalloc::bin_size(1), Some(16));
    assert_eq!(BinnedMalloc::bin_size(100), Some(112));
    assert_eq!(BinnedMalloc::bin_size(128), Some(128));
    assert_eq!(BinnedMalloc::bin_size(129), Some(160));
    assert_eq!(BinnedMalloc::bin_size(256), Some(256));
    assert_eq!(BinnedMalloc::bin_size(257), Some(320));
    assert_eq!(BinnedMalloc::bin_size(64 * 1024), Some(64 * 1024));
    assert_eq!(BinnedMalloc::bin_size(64 * 1024 + 1), Some(68 * 1024));
}

#[test]
fn test_bin_sizes_are_monotonic() {
    fastrand::seed(71_402_113);
    for _ in 0..10_000 {
        let a = fastrand::usize(1..1 << 20);
        let b = a + fastrand::usize(0..4096);
        let bin_a = BinnedMalloc::bin_size(a).unwrap();
        let bin_b = BinnedMalloc::bin_size(b).unwrap();
        assert!(bin_a >= a);
        assert!(bin_b >= bin_a);
    }
}

#[test]
fn test_binned_resize_within_class_keeps_block() {
    unsafe {
        let p = BinnedMalloc::realloc(None, 0, 130, DEFAULT_ALIGNMENT).unwrap();
        p.as_ptr().write(42);
        let q = BinnedMalloc::realloc(Some(p), 130, 150, DEFAULT_ALIGNMENT).unwrap();
        assert_eq!(p, q);
        assert_eq!(q.as_ptr().read(), 42);

        let r = BinnedMalloc::realloc(Some(q), 150, 1000, DEFAULT_ALIGNMENT).unwrap();
        assert_eq!(r.as_ptr().read(), 42);
        assert!(BinnedMalloc::realloc(Some(r), 1000, 0, DEFAULT_ALIGNMENT).is_none());
    }
}

#[test]
fn test_binned_quantize_respects_alignment() {
    assert_eq!(BinnedMalloc::quantize_size(20, 0), 32);
    assert_eq!(BinnedMalloc::quantize_size(20, 64), 64);
    let p: Option<NonNull<u8>> = unsafe { BinnedMalloc::realloc(None, 0, 20, 64) };
    let p = p.unwrap();
    assert!(is_ptr_aligned(p.as_ptr(), 64));
    unsafe { BinnedMalloc::realloc(Some(p), 20, 0, 64) };
}
