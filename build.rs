fn main() {
    // The assembly sources are pulled in with `global_asm!(include_str!(..))`,
    // so the build script only has to keep cargo's change tracking honest.
    println!("cargo:rerun-if-changed=src/boot.s");
    println!("cargo:rerun-if-changed=src/exceptions.s");
    println!("cargo:rerun-if-changed=src/trampoline.s");
    println!("cargo:rerun-if-changed=linker.ld");
}
