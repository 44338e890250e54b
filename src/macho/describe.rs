//! Human-readable descriptions of load command identifiers.
//!
//! Used only for diagnostics while walking a header's load commands.

use super::constants::*;

/// Returns `"NAME * description"` for a known load command.
pub fn describe_load_command(cmd: u32) -> Option<&'static str> {
    let info = match cmd {
        LC_SEGMENT => "LC_SEGMENT * segment of this file to be mapped",
        LC_SYMTAB => "LC_SYMTAB * link-edit stab symbol table info",
        LC_SYMSEG => "LC_SYMSEG * link-edit gdb symbol table info (obsolete)",
        LC_THREAD => "LC_THREAD * thread",
        LC_UNIXTHREAD => "LC_UNIXTHREAD * unix thread (includes a stack)",
        LC_LOADFVMLIB => "LC_LOADFVMLIB * load a specified fixed VM shared library",
        LC_IDFVMLIB => "LC_IDFVMLIB * fixed VM shared library identification",
        LC_IDENT => "LC_IDENT * object identification info (obsolete)",
        LC_FVMFILE => "LC_FVMFILE * fixed VM file inclusion (internal use)",
        LC_PREPAGE => "LC_PREPAGE * prepage command (internal use)",
        LC_DYSYMTAB => "LC_DYSYMTAB * dynamic link-edit symbol table info",
        LC_LOAD_DYLIB => "LC_LOAD_DYLIB * load a dynamically linked shared library",
        LC_ID_DYLIB => "LC_ID_DYLIB * dynamically linked shared lib ident",
        LC_LOAD_DYLINKER => "LC_LOAD_DYLINKER * load a dynamic linker",
        LC_ID_DYLINKER => "LC_ID_DYLINKER * dynamic linker identification",
        LC_PREBOUND_DYLIB => "LC_PREBOUND_DYLIB * modules prebound for a dynamically linked shared library",
        LC_ROUTINES => "LC_ROUTINES * image routines",
        LC_SUB_FRAMEWORK => "LC_SUB_FRAMEWORK * sub framework",
        LC_SUB_UMBRELLA => "LC_SUB_UMBRELLA * sub umbrella",
        LC_SUB_CLIENT => "LC_SUB_CLIENT * sub client",
        LC_SUB_LIBRARY => "LC_SUB_LIBRARY * sub library",
        LC_TWOLEVEL_HINTS => "LC_TWOLEVEL_HINTS * two-level namespace lookup hints",
        LC_PREBIND_CKSUM => "LC_PREBIND_CKSUM * prebind checksum",
        LC_LOAD_WEAK_DYLIB => "LC_LOAD_WEAK_DYLIB * load a weakly linked shared library",
        LC_SEGMENT_64 => "LC_SEGMENT_64 * 64-bit segment of this file to be mapped",
        LC_ROUTINES_64 => "LC_ROUTINES_64 * 64-bit image routines",
        LC_UUID => "LC_UUID * the uuid",
        LC_RPATH => "LC_RPATH * runpath additions",
        LC_CODE_SIGNATURE => "LC_CODE_SIGNATURE * local of code signature",
        LC_SEGMENT_SPLIT_INFO => "LC_SEGMENT_SPLIT_INFO * local of info to split segments",
        LC_REEXPORT_DYLIB => "LC_REEXPORT_DYLIB * load and re-export dylib",
        LC_LAZY_LOAD_DYLIB => "LC_LAZY_LOAD_DYLIB * delay load of dylib until first use",
        LC_ENCRYPTION_INFO => "LC_ENCRYPTION_INFO * encrypted segment information",
        LC_DYLD_INFO => "LC_DYLD_INFO * compressed dyld information",
        LC_DYLD_INFO_ONLY => "LC_DYLD_INFO_ONLY * compressed dyld information only",
        LC_LOAD_UPWARD_DYLIB => "LC_LOAD_UPWARD_DYLIB * load upward dylib",
        LC_VERSION_MIN_MACOSX => "LC_VERSION_MIN_MACOSX * build for MacOSX min OS version",
        LC_VERSION_MIN_IPHONEOS => "LC_VERSION_MIN_IPHONEOS * build for iPhoneOS min OS version",
        LC_FUNCTION_STARTS => "LC_FUNCTION_STARTS * compressed table of function start addresses",
        LC_DYLD_ENVIRONMENT => "LC_DYLD_ENVIRONMENT * string for dyld to treat like environment variable",
        LC_MAIN => "LC_MAIN * replacement for LC_UNIXTHREAD",
        LC_DATA_IN_CODE => "LC_DATA_IN_CODE * table of non-instructions in __text",
        LC_SOURCE_VERSION => "LC_SOURCE_VERSION * source version used to build binary",
        LC_DYLIB_CODE_SIGN_DRS => "LC_DYLIB_CODE_SIGN_DRS * code signing DRs copied from linked dylibs",
        LC_ENCRYPTION_INFO_64 => "LC_ENCRYPTION_INFO_64 * 64-bit encrypted segment information",
        LC_LINKER_OPTION => "LC_LINKER_OPTION * linker options in MH_OBJECT files",
        LC_LINKER_OPTIMIZATION_HINT => "LC_LINKER_OPTIMIZATION_HINT * optimization hints in MH_OBJECT files",
        LC_VERSION_MIN_TVOS => "LC_VERSION_MIN_TVOS * build for AppleTV min OS version",
        LC_VERSION_MIN_WATCHOS => "LC_VERSION_MIN_WATCHOS * build for Watch min OS version",
        LC_NOTE => "LC_NOTE * arbitrary data included within a Mach-O file",
        LC_BUILD_VERSION => "LC_BUILD_VERSION * build for platform min OS version",
        LC_DYLD_EXPORTS_TRIE => "LC_DYLD_EXPORTS_TRIE * exports trie",
        LC_DYLD_CHAINED_FIXUPS => "LC_DYLD_CHAINED_FIXUPS * chained fixups",
        LC_FILESET_ENTRY => "LC_FILESET_ENTRY * file set entry",
        _ => return None,
    };
    Some(info)
}

/// Describes a load command, falling back to its numeric identifier.
pub fn load_command_info(cmd: u32) -> String {
    match describe_load_command(cmd) {
        Some(info) => info.to_string(),
        None => format!("Unknown load command {cmd:#x}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_commands() {
        assert_eq!(
            describe_load_command(LC_SEGMENT_64),
            Some("LC_SEGMENT_64 * 64-bit segment of this file to be mapped")
        );
        assert!(describe_load_command(LC_MAIN).unwrap().starts_with("LC_MAIN "));
        // LC_REQ_DYLD is part of the identifier.
        assert!(describe_load_command(0x28).is_none());
    }

    #[test]
    fn test_unknown_command_falls_back() {
        assert_eq!(load_command_info(0x7777), "Unknown load command 0x7777");
    }
}
